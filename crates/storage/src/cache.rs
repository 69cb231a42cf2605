//! Record cache
//!
//! Write-through, read-aside accelerator owned by the persistence manager.
//! Entries never expire by time and are dropped only by an explicit clear or
//! by LRU eviction once the entry bound is reached. The cache is never a
//! source of truth: a missing entry is simply re-read from the backend.

use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;

use crate::record::Record;

/// Key of a cached record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// An assessment, by id
    Assessment(String),
    /// The singleton user profile
    UserProfile,
    /// A preference, by key
    Preference(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Assessment(id) => write!(f, "assessment_{}", id),
            CacheKey::UserProfile => f.write_str("user_profile"),
            CacheKey::Preference(key) => write!(f, "pref_{}", key),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached records
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
}

/// In-memory LRU cache of records
pub struct RecordCache {
    entries: Mutex<LruCache<CacheKey, Record>>,
}

impl RecordCache {
    /// Create a new record cache
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a copy of a cached record
    pub fn get(&self, key: &CacheKey) -> Option<Record> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert or replace a record
    pub fn put(&self, key: CacheKey, record: Record) {
        self.entries.lock().put(key, record);
    }

    /// Remove a record, returning whether it was cached
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Check if a key is cached
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains(key)
    }

    /// Copies of every cached assessment, in no particular order
    pub fn assessments(&self) -> Vec<Record> {
        self.entries
            .lock()
            .iter()
            .filter(|(key, _)| matches!(key, CacheKey::Assessment(_)))
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Record {
        json!({"id": id}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_cache_basic() {
        let cache = RecordCache::new(&CacheConfig::new().max_entries(10));

        cache.put(CacheKey::UserProfile, record("user_profile"));

        assert!(cache.contains(&CacheKey::UserProfile));
        assert_eq!(cache.get(&CacheKey::UserProfile), Some(record("user_profile")));
        assert_eq!(cache.get(&CacheKey::Preference("theme".into())), None);
    }

    #[test]
    fn test_cache_key_display() {
        assert_eq!(CacheKey::Assessment("abc".into()).to_string(), "assessment_abc");
        assert_eq!(CacheKey::UserProfile.to_string(), "user_profile");
        assert_eq!(CacheKey::Preference("theme".into()).to_string(), "pref_theme");
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = RecordCache::new(&CacheConfig::new().max_entries(2));

        cache.put(CacheKey::Assessment("1".into()), record("1"));
        cache.put(CacheKey::Assessment("2".into()), record("2"));
        cache.put(CacheKey::Assessment("3".into()), record("3"));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::Assessment("1".into())));
        assert!(cache.contains(&CacheKey::Assessment("3".into())));
    }

    #[test]
    fn test_assessments_snapshot() {
        let cache = RecordCache::new(&CacheConfig::new());

        cache.put(CacheKey::Assessment("a".into()), record("a"));
        cache.put(CacheKey::UserProfile, record("user_profile"));
        cache.put(CacheKey::Preference("theme".into()), record("theme"));

        let assessments = cache.assessments();
        assert_eq!(assessments.len(), 1);
        assert_eq!(assessments[0]["id"], "a");
    }

    #[test]
    fn test_cache_remove_and_clear() {
        let cache = RecordCache::new(&CacheConfig::new());

        cache.put(CacheKey::Assessment("a".into()), record("a"));
        assert!(cache.remove(&CacheKey::Assessment("a".into())));
        assert!(!cache.remove(&CacheKey::Assessment("a".into())));

        cache.put(CacheKey::UserProfile, record("user_profile"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_falls_back_to_one() {
        let cache = RecordCache::new(&CacheConfig::new().max_entries(0));
        cache.put(CacheKey::UserProfile, record("user_profile"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_returned_records_are_copies() {
        let cache = RecordCache::new(&CacheConfig::new());
        cache.put(CacheKey::UserProfile, record("user_profile"));

        let mut copy = cache.get(&CacheKey::UserProfile).unwrap();
        copy.insert("name".into(), json!("changed"));

        assert!(cache.get(&CacheKey::UserProfile).unwrap().get("name").is_none());
    }
}
