//! Storage layer for the EMA dashboard
//!
//! This crate provides the record model, a backend contract with SQLite,
//! key-value and in-memory implementations, a record cache, and the
//! persistence manager that ties them together.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cache;
pub mod database;
pub mod kv;
pub mod manager;
pub mod memory;
pub mod policy;
pub mod record;

pub use backend::{BackendError, BackendKind, QueryOptions, StorageBackend};
pub use cache::{CacheConfig, CacheKey, RecordCache};
pub use database::{DatabaseBackend, DatabaseConfig, SqliteDatabase};
pub use kv::{KvBackend, KvConfig, KvStore};
pub use manager::{
    default_profile, BackendSelection, ExportSnapshot, HealthReport, HealthStatus,
    PersistenceConfig, PersistenceManager, SkipReason, StorageError,
};
pub use memory::MemoryBackend;
pub use policy::{Durability, Operation};
pub use record::{Collection, Record, SortOrder};
