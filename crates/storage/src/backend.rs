//! Backend contract
//!
//! Every storage medium implements [`StorageBackend`]. The persistence manager
//! is written against this trait alone and never learns which medium is active.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::database::DatabaseError;
use crate::kv::KvError;
use crate::record::{sort_records, Collection, Record, SortOrder};

/// Backend error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// SQLite backend error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Key-value backend error
    #[error("Key-value error: {0}")]
    KeyValue(#[from] KvError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record has no string id
    #[error("Record in {0} has no string id")]
    MissingId(Collection),

    /// Storage medium could not carry out the call
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Concrete storage medium behind the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Structured, schema-versioned SQLite database
    #[serde(rename = "SQLite")]
    Database,
    /// Flat key-value store
    KeyValue,
    /// Process-lifetime in-memory map
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Database => f.write_str("SQLite"),
            BackendKind::KeyValue => f.write_str("KeyValue"),
            BackendKind::Memory => f.write_str("Memory"),
        }
    }
}

/// Options for listing a collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of records returned
    pub limit: Option<usize>,
    /// Field to order by (lexically)
    pub sort_by: Option<String>,
    /// Sort direction
    pub order: SortOrder,
}

impl QueryOptions {
    /// Create empty query options: no limit, unsorted
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of records
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the field to sort by
    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self
    }

    /// Set the sort direction
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Sort and truncate an unordered result set in memory
    pub fn apply(&self, mut records: Vec<Record>) -> Vec<Record> {
        if let Some(field) = &self.sort_by {
            sort_records(&mut records, field, self.order);
        }

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        records
    }
}

/// Storage backend abstraction trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which medium this backend writes to
    fn kind(&self) -> BackendKind;

    /// Insert or replace a record by its `id`, returning the id
    async fn save(&self, collection: Collection, record: &Record) -> Result<String>;

    /// Fetch one record by id
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    /// Fetch records of a collection, sorted and limited per `options`
    async fn get_all(&self, collection: Collection, options: &QueryOptions) -> Result<Vec<Record>>;

    /// Delete one record, returning whether it existed
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    /// Remove every record from every collection
    async fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, ts: &str) -> Record {
        json!({"id": id, "timestamp": ts}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_sorts_then_limits() {
        let records = vec![
            record("a", "2024-01-01"),
            record("b", "2024-03-01"),
            record("c", "2024-02-01"),
        ];

        let options = QueryOptions::new().sort_by("timestamp").order(SortOrder::Desc).limit(2);
        let result = options.apply(records);

        let ids: Vec<_> = result.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_apply_without_sort_keeps_order() {
        let records = vec![record("z", "1"), record("a", "2")];
        let result = QueryOptions::new().apply(records);
        assert_eq!(result[0]["id"], "z");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Database.to_string(), "SQLite");
        assert_eq!(BackendKind::KeyValue.to_string(), "KeyValue");
        assert_eq!(BackendKind::Memory.to_string(), "Memory");
        assert_eq!(serde_json::to_value(BackendKind::Database).unwrap(), json!("SQLite"));
    }
}
