//! Structured database backend
//!
//! This module provides the SQLite backend: connection pooling, versioned
//! schema migrations, and one table per collection. Time-ordered collections
//! carry an indexed `sort_time` column so that listing them by their time
//! field is answered by the index instead of a full scan.

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Error as SqlxError, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::backend::{BackendError, BackendKind, QueryOptions, StorageBackend};
use crate::record::{record_id, sort_key, Collection, Record, SortOrder};

/// Database error types
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: String,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Enable WAL mode
    pub wal_mode: bool,
    /// Synchronous mode
    pub synchronous: SynchronousMode,
}

/// SQLite synchronous mode
#[derive(Debug, Clone, Copy)]
pub enum SynchronousMode {
    /// Off - no synchronization
    Off,
    /// Normal - synchronize at critical moments
    Normal,
    /// Full - synchronize after each write
    Full,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "ema_dashboard.db".to_string(),
            max_connections: 4,
            connect_timeout: Duration::from_secs(30),
            wal_mode: true,
            synchronous: SynchronousMode::Normal,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable WAL mode
    pub fn wal_mode(mut self, enabled: bool) -> Self {
        self.wal_mode = enabled;
        self
    }

    /// Set synchronous mode
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }
}

/// SQLite connection pool with migration support
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Create a new SQLite database with configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| DatabaseError::Config(e.to_string()))?
            .create_if_missing(true);

        if config.wal_mode {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        options = match config.synchronous {
            SynchronousMode::Off => options.synchronous(SqliteSynchronous::Off),
            SynchronousMode::Normal => options.synchronous(SqliteSynchronous::Normal),
            SynchronousMode::Full => options.synchronous(SqliteSynchronous::Full),
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self { pool })
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run migrations
    ///
    /// Already-applied migrations are checked against their recorded checksum;
    /// a changed definition is rejected rather than silently skipped.
    pub async fn migrate(&self, migrations: &[MigrationDefinition]) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                checksum TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let applied: Vec<(i64, String)> =
            sqlx::query_as("SELECT version, checksum FROM _migrations ORDER BY version")
                .fetch_all(&self.pool)
                .await?;

        for migration in migrations {
            if let Some((_, checksum)) = applied.iter().find(|(v, _)| *v == migration.version) {
                if *checksum != migration.checksum {
                    return Err(DatabaseError::Migration(format!(
                        "Checksum mismatch for migration {}",
                        migration.version
                    )));
                }
                continue;
            }

            tracing::info!(
                "Applying migration {} - {}",
                migration.version,
                migration.description
            );

            let mut tx = self.pool.begin().await?;

            sqlx::query(&migration.sql).execute(&mut *tx).await?;

            sqlx::query("INSERT INTO _migrations (version, description, checksum) VALUES (?, ?, ?)")
                .bind(migration.version)
                .bind(&migration.description)
                .bind(&migration.checksum)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }

        Ok(())
    }

    /// Get current migration version
    pub async fn current_version(&self) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;

        Ok(version.unwrap_or(0))
    }

    /// Check if the database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Migration definition
#[derive(Debug, Clone)]
pub struct MigrationDefinition {
    /// Migration version number
    pub version: i64,
    /// Migration description
    pub description: String,
    /// SQL to execute
    pub sql: String,
    /// Checksum for verification
    pub checksum: String,
}

impl MigrationDefinition {
    /// Create a new migration definition
    pub fn new(version: i64, description: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = format!("{:x}", md5::compute(&sql));

        Self {
            version,
            description: description.into(),
            sql,
            checksum,
        }
    }
}

/// Schema for the four collections, one statement per migration
pub fn schema_migrations() -> Vec<MigrationDefinition> {
    vec![
        MigrationDefinition::new(
            1,
            "Create assessments",
            "CREATE TABLE IF NOT EXISTS assessments (
                id TEXT PRIMARY KEY NOT NULL,
                sort_time TEXT NOT NULL DEFAULT '',
                data TEXT NOT NULL
            )",
        ),
        MigrationDefinition::new(
            2,
            "Index assessments by timestamp",
            "CREATE INDEX IF NOT EXISTS idx_assessments_sort_time ON assessments (sort_time, id)",
        ),
        MigrationDefinition::new(
            3,
            "Create user profile",
            "CREATE TABLE IF NOT EXISTS user_profile (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL
            )",
        ),
        MigrationDefinition::new(
            4,
            "Create sessions",
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY NOT NULL,
                sort_time TEXT NOT NULL DEFAULT '',
                data TEXT NOT NULL
            )",
        ),
        MigrationDefinition::new(
            5,
            "Index sessions by start time",
            "CREATE INDEX IF NOT EXISTS idx_sessions_sort_time ON sessions (sort_time, id)",
        ),
        MigrationDefinition::new(
            6,
            "Create preferences",
            "CREATE TABLE IF NOT EXISTS preferences (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL
            )",
        ),
    ]
}

fn table(collection: Collection) -> &'static str {
    match collection {
        Collection::Assessments => "assessments",
        Collection::UserProfile => "user_profile",
        Collection::Sessions => "sessions",
        Collection::Preferences => "preferences",
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

/// Backend storing each collection in its own SQLite table
pub struct DatabaseBackend {
    db: SqliteDatabase,
}

impl DatabaseBackend {
    /// Connect and bring the schema up to date
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let db = SqliteDatabase::new(config).await?;
        let backend = Self::with_database(db).await?;
        tracing::info!("Opened SQLite database at {}", config.path);
        Ok(backend)
    }

    /// Wrap an existing database, applying the schema
    pub async fn with_database(db: SqliteDatabase) -> Result<Self> {
        db.migrate(&schema_migrations()).await?;
        Ok(Self { db })
    }

    /// Underlying database
    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    async fn upsert(&self, collection: Collection, id: &str, record: &Record) -> Result<()> {
        let data = serde_json::to_string(record)?;
        let table = table(collection);

        match collection.time_field() {
            Some(field) => {
                let sql = format!(
                    "INSERT INTO {table} (id, sort_time, data) VALUES (?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET sort_time = excluded.sort_time, data = excluded.data"
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(sort_key(record, field))
                    .bind(data)
                    .execute(&self.db.pool)
                    .await?;
            }
            None => {
                let sql = format!(
                    "INSERT INTO {table} (id, data) VALUES (?, ?)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data"
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(data)
                    .execute(&self.db.pool)
                    .await?;
            }
        }

        Ok(())
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?", table(collection));
        let data: Option<String> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;

        data.map(|d| serde_json::from_str::<Record>(&d))
            .transpose()
            .map_err(DatabaseError::from)
    }

    async fn fetch_all(&self, collection: Collection, options: &QueryOptions) -> Result<Vec<Record>> {
        let table = table(collection);
        let indexed = collection
            .time_field()
            .is_some_and(|field| options.sort_by.as_deref() == Some(field));

        if indexed {
            let dir = direction(options.order);
            let limit = options
                .limit
                .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
                .unwrap_or(-1);
            let sql = format!("SELECT data FROM {table} ORDER BY sort_time {dir}, id {dir} LIMIT ?");
            let rows: Vec<String> = sqlx::query_scalar(&sql)
                .bind(limit)
                .fetch_all(&self.db.pool)
                .await?;

            return rows
                .iter()
                .map(|d| serde_json::from_str::<Record>(d).map_err(DatabaseError::from))
                .collect();
        }

        let sql = format!("SELECT data FROM {table}");
        let rows: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.db.pool).await?;
        let records = rows
            .iter()
            .map(|d| serde_json::from_str(d))
            .collect::<std::result::Result<Vec<Record>, _>>()?;

        Ok(options.apply(records))
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table(collection));
        let result = sqlx::query(&sql).bind(id).execute(&self.db.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn wipe(&self) -> Result<()> {
        let mut tx = self.db.pool.begin().await?;

        for collection in Collection::ALL {
            let sql = format!("DELETE FROM {}", table(collection));
            sqlx::query(&sql).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for DatabaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    async fn save(
        &self,
        collection: Collection,
        record: &Record,
    ) -> std::result::Result<String, BackendError> {
        let id = record_id(record)
            .ok_or(BackendError::MissingId(collection))?
            .to_string();

        self.upsert(collection, &id, record).await?;
        Ok(id)
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> std::result::Result<Option<Record>, BackendError> {
        Ok(self.fetch(collection, id).await?)
    }

    async fn get_all(
        &self,
        collection: Collection,
        options: &QueryOptions,
    ) -> std::result::Result<Vec<Record>, BackendError> {
        Ok(self.fetch_all(collection, options).await?)
    }

    async fn delete(&self, collection: Collection, id: &str) -> std::result::Result<bool, BackendError> {
        Ok(self.remove(collection, id).await?)
    }

    async fn clear(&self) -> std::result::Result<(), BackendError> {
        Ok(self.wipe().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn backend() -> DatabaseBackend {
        let db = SqliteDatabase::in_memory().await.unwrap();
        DatabaseBackend::with_database(db).await.unwrap()
    }

    #[tokio::test]
    async fn test_database_creation() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        assert!(db.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_schema_applied() {
        let backend = backend().await;
        let version = backend.database().current_version().await.unwrap();
        assert_eq!(version, schema_migrations().len() as i64);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name != '_migrations' ORDER BY name",
        )
        .fetch_all(backend.database().pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["assessments", "preferences", "sessions", "user_profile"]);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let db = SqliteDatabase::in_memory().await.unwrap();

        db.migrate(&schema_migrations()).await.unwrap();
        let version1 = db.current_version().await.unwrap();

        db.migrate(&schema_migrations()).await.unwrap();
        let version2 = db.current_version().await.unwrap();

        assert_eq!(version1, version2);
    }

    #[tokio::test]
    async fn test_migration_checksum_mismatch() {
        let db = SqliteDatabase::in_memory().await.unwrap();

        let original = vec![MigrationDefinition::new(
            1,
            "Initial schema",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
        )];
        db.migrate(&original).await.unwrap();

        let edited = vec![MigrationDefinition::new(
            1,
            "Initial schema",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)",
        )];
        let result = db.migrate(&edited).await;
        assert!(matches!(result, Err(DatabaseError::Migration(_))));
    }

    #[tokio::test]
    async fn test_save_get_roundtrip() {
        let backend = backend().await;
        let input = record(json!({"id": "a1", "timestamp": "2024-01-01T00:00:00.000Z", "score": 4}));

        let id = backend.save(Collection::Assessments, &input).await.unwrap();
        assert_eq!(id, "a1");

        let fetched = backend.get(Collection::Assessments, "a1").await.unwrap();
        assert_eq!(fetched, Some(input));
        assert_eq!(backend.get(Collection::Assessments, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_overwrites_by_id() {
        let backend = backend().await;
        backend
            .save(Collection::UserProfile, &record(json!({"id": "user_profile", "name": "a"})))
            .await
            .unwrap();
        backend
            .save(Collection::UserProfile, &record(json!({"id": "user_profile", "name": "b"})))
            .await
            .unwrap();

        let all = backend
            .get_all(Collection::UserProfile, &QueryOptions::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["name"], "b");
    }

    #[tokio::test]
    async fn test_indexed_listing_matches_in_memory_order() {
        let backend = backend().await;
        for (id, ts) in [
            ("a", "2024-01-02T00:00:00.000Z"),
            ("b", "2024-01-10T00:00:00.000Z"),
            ("c", "2024-01-05T00:00:00.000Z"),
            ("d", "2024-01-05T00:00:00.000Z"),
        ] {
            backend
                .save(Collection::Assessments, &record(json!({"id": id, "timestamp": ts})))
                .await
                .unwrap();
        }

        let options = QueryOptions::new().sort_by("timestamp").order(SortOrder::Desc).limit(3);
        let indexed = backend.get_all(Collection::Assessments, &options).await.unwrap();
        let ids: Vec<_> = indexed.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["b", "d", "c"]);

        let all = backend
            .get_all(Collection::Assessments, &QueryOptions::new())
            .await
            .unwrap();
        let scanned = options.apply(all);
        assert_eq!(indexed, scanned);
    }

    #[tokio::test]
    async fn test_non_indexed_sort_field() {
        let backend = backend().await;
        for (id, rate) in [("a", "0.5"), ("b", "0.9"), ("c", "0.1")] {
            backend
                .save(Collection::Assessments, &record(json!({"id": id, "successRate": rate})))
                .await
                .unwrap();
        }

        let options = QueryOptions::new().sort_by("successRate").order(SortOrder::Asc);
        let result = backend.get_all(Collection::Assessments, &options).await.unwrap();
        let ids: Vec<_> = result.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let backend = backend().await;
        for collection in Collection::ALL {
            backend
                .save(collection, &record(json!({"id": "x"})))
                .await
                .unwrap();
        }

        assert!(backend.delete(Collection::Sessions, "x").await.unwrap());
        assert!(!backend.delete(Collection::Sessions, "x").await.unwrap());

        backend.clear().await.unwrap();
        for collection in Collection::ALL {
            let all = backend.get_all(collection, &QueryOptions::new()).await.unwrap();
            assert!(all.is_empty());
        }
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let config = DatabaseConfig::new(path.to_string_lossy().to_string());

        {
            let backend = DatabaseBackend::open(&config).await.unwrap();
            backend
                .save(Collection::Preferences, &record(json!({"id": "theme", "value": "dark"})))
                .await
                .unwrap();
            backend.database().close().await;
        }

        let backend = DatabaseBackend::open(&config).await.unwrap();
        let pref = backend.get(Collection::Preferences, "theme").await.unwrap().unwrap();
        assert_eq!(pref["value"], "dark");
    }

    #[tokio::test]
    async fn test_open_fails_without_parent_dir() {
        let config = DatabaseConfig::new("/nonexistent-dir-for-tests/sub/test.db");
        assert!(DatabaseBackend::open(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DatabaseConfig::new("test.db")
            .max_connections(5)
            .connect_timeout(Duration::from_secs(10))
            .wal_mode(true)
            .synchronous(SynchronousMode::Full);

        assert_eq!(config.path, "test.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.wal_mode);
        assert!(matches!(config.synchronous, SynchronousMode::Full));
    }
}
