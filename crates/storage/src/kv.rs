//! Flat key-value backend
//!
//! Records are stored as JSON bytes in a sled tree under composite keys of the
//! form `"{prefix}{collection}_{id}"`. Listing a collection scans its key
//! prefix, so it is linear in the size of the collection; expected volumes
//! are small.
//!
//! sled calls block, so the backend runs each of them on tokio's blocking
//! pool. That keeps the runtime responsive and lets callers bound a call with
//! a timeout.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use thiserror::Error;

use crate::backend::{BackendError, BackendKind, QueryOptions, StorageBackend};
use crate::record::{record_id, Collection, Record};

/// Key-value store error types
#[derive(Debug, Error)]
pub enum KvError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored key is not valid UTF-8
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for key-value operations
pub type Result<T> = std::result::Result<T, KvError>;

/// Default prefix for keys owned by this application
pub const DEFAULT_KEY_PREFIX: &str = "ema_dashboard_";

/// Key-value store configuration
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Database path
    pub path: String,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Enable compression
    pub use_compression: bool,
    /// Flush interval in milliseconds (None for immediate flush)
    pub flush_every_ms: Option<u64>,
    /// Prefix prepended to every key
    pub key_prefix: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: "ema_dashboard_kv".to_string(),
            cache_capacity: 16 * 1024 * 1024, // 16MB
            use_compression: true,
            flush_every_ms: Some(500),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl KvConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Enable or disable compression
    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }

    /// Set flush interval in milliseconds
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Set the key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Thin typed wrapper over a sled tree
#[derive(Clone)]
pub struct KvStore {
    db: Db,
}

impl KvStore {
    /// Open a key-value store with configuration
    pub fn new(config: &KvConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .use_compression(config.use_compression)
            .flush_every_ms(config.flush_every_ms)
            .open()?;

        Ok(Self { db })
    }

    /// Create a temporary key-value store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Get a value by key
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Set a value by key
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Remove a value by key
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    /// Get all keys with a given prefix
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| KvError::InvalidKey(e.to_string()))?;
            keys.push(key);
        }

        Ok(keys)
    }

    /// Get all values whose key starts with `prefix`
    pub fn values_with_prefix<T>(&self, prefix: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut values = Vec::new();

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            values.push(serde_json::from_slice(&bytes)?);
        }

        Ok(values)
    }

    /// Remove every key starting with `prefix`, returning how many were removed
    pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let mut count = 0;
        for key in self.keys_with_prefix(prefix)? {
            if self.remove(&key)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

/// Run a blocking store call on the blocking thread pool
pub(crate) async fn run_blocking<T, F>(call: F) -> std::result::Result<T, BackendError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => Ok(result?),
        Err(e) => Err(BackendError::Unavailable(format!(
            "key-value task failed: {}",
            e
        ))),
    }
}

/// Backend storing each record under a composite key
pub struct KvBackend {
    store: KvStore,
    prefix: String,
}

impl KvBackend {
    /// Open the key-value backend
    pub fn open(config: &KvConfig) -> Result<Self> {
        let store = KvStore::new(config)?;
        tracing::debug!("Opened key-value store at {}", config.path);
        Ok(Self::with_store(store, config.key_prefix.clone()))
    }

    /// Wrap an existing store
    pub fn with_store(store: KvStore, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into() }
    }

    /// Underlying store
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    fn collection_prefix(&self, collection: Collection) -> String {
        format!("{}{}_", self.prefix, collection.as_str())
    }

    fn key(&self, collection: Collection, id: &str) -> String {
        format!("{}{}", self.collection_prefix(collection), id)
    }
}

#[async_trait]
impl StorageBackend for KvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn save(
        &self,
        collection: Collection,
        record: &Record,
    ) -> std::result::Result<String, BackendError> {
        let id = record_id(record)
            .ok_or(BackendError::MissingId(collection))?
            .to_string();

        let store = self.store.clone();
        let key = self.key(collection, &id);
        let record = record.clone();
        run_blocking(move || store.set(&key, &record)).await?;

        Ok(id)
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> std::result::Result<Option<Record>, BackendError> {
        let store = self.store.clone();
        let key = self.key(collection, id);
        run_blocking(move || store.get::<Record>(&key)).await
    }

    async fn get_all(
        &self,
        collection: Collection,
        options: &QueryOptions,
    ) -> std::result::Result<Vec<Record>, BackendError> {
        let store = self.store.clone();
        let prefix = self.collection_prefix(collection);
        let records = run_blocking(move || store.values_with_prefix::<Record>(&prefix)).await?;

        Ok(options.apply(records))
    }

    async fn delete(&self, collection: Collection, id: &str) -> std::result::Result<bool, BackendError> {
        let store = self.store.clone();
        let key = self.key(collection, id);
        run_blocking(move || store.remove(&key)).await
    }

    async fn clear(&self) -> std::result::Result<(), BackendError> {
        let store = self.store.clone();
        let prefix = self.prefix.clone();
        let removed = run_blocking(move || {
            let removed = store.remove_prefix(&prefix)?;
            store.flush()?;
            Ok(removed)
        })
        .await?;

        tracing::debug!("Removed {} keys from key-value store", removed);
        Ok(())
    }
}
