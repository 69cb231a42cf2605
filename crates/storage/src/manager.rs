//! Persistence manager
//!
//! The single entry point the application uses for stored data. It picks a
//! backend once, fronts it with a write-through record cache, stamps ids and
//! timestamps, and applies the per-operation [`Durability`] policy.
//!
//! Construct one manager at startup and share it by `Arc`. Any operation
//! issued before initialization has finished waits for it.
//!
//! # Cache consistency
//!
//! Writes update the cache before the backend. If the backend write then
//! fails, the cache is ahead of durable storage until the next clear; callers
//! of [`PersistenceManager::save_assessment`] see the error and must account
//! for it.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::backend::{BackendError, BackendKind, QueryOptions, StorageBackend};
use crate::cache::{CacheConfig, CacheKey, RecordCache};
use crate::database::{DatabaseBackend, DatabaseConfig};
use crate::kv::{KvBackend, KvConfig};
use crate::memory::MemoryBackend;
use crate::policy::{Durability, Operation};
use crate::record::{generate_id, now_iso, record_id, Collection, Record, ID_FIELD};

/// Id of the singleton user profile
pub const PROFILE_ID: &str = "user_profile";

/// Schema version stamped on assessments and exports
pub const SCHEMA_VERSION: &str = "1.0";

/// Default number of records returned by list operations
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Number of assessments included in an export
pub const EXPORT_LIMIT: usize = 1000;

/// Errors surfaced to callers of the persistence manager
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend rejected a write
    #[error("Write to {collection} failed: {source}")]
    Write {
        /// Collection being written
        collection: Collection,
        /// Backend failure
        #[source]
        source: BackendError,
    },

    /// Backend failed a read
    #[error("Read from {collection} failed: {source}")]
    Read {
        /// Collection being read
        collection: Collection,
        /// Backend failure
        #[source]
        source: BackendError,
    },

    /// Backend failed to clear its collections
    #[error("Clear failed: {0}")]
    Clear(#[source] BackendError),

    /// Backend call did not finish in time
    #[error("Backend {call} timed out after {after:?}")]
    Timeout {
        /// Backend call that timed out
        call: &'static str,
        /// Configured bound
        after: Duration,
    },

    /// Payload is not a JSON object
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Export could not be assembled
    #[error("Data export failed: {0}")]
    Export(String),

    /// Import snapshot could not be read
    #[error("Data import failed: {0}")]
    Import(String),
}

/// Result type for persistence manager operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistence manager configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// SQLite settings; `None` means the database backend is unavailable
    pub database: Option<DatabaseConfig>,
    /// Key-value settings; `None` means the key-value backend is unavailable
    pub key_value: Option<KvConfig>,
    /// Record cache settings
    pub cache: CacheConfig,
    /// Bound on every backend call
    pub operation_timeout: Duration,
    /// Bound on opening each candidate backend
    pub init_timeout: Duration,
    /// Backends to try, in order; memory is always the last resort
    pub candidates: Vec<BackendKind>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database: None,
            key_value: None,
            cache: CacheConfig::default(),
            operation_timeout: Duration::from_secs(10),
            init_timeout: Duration::from_secs(30),
            candidates: vec![BackendKind::Database, BackendKind::KeyValue, BackendKind::Memory],
        }
    }
}

impl PersistenceConfig {
    /// Create a configuration with no durable backend configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that only ever uses the in-memory backend
    pub fn in_memory() -> Self {
        Self::default().candidates(vec![BackendKind::Memory])
    }

    /// Enable the SQLite backend
    pub fn database(mut self, config: DatabaseConfig) -> Self {
        self.database = Some(config);
        self
    }

    /// Enable the key-value backend
    pub fn key_value(mut self, config: KvConfig) -> Self {
        self.key_value = Some(config);
        self
    }

    /// Set cache configuration
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Set the backend call timeout
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the per-candidate open timeout
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the candidate order
    pub fn candidates(mut self, candidates: Vec<BackendKind>) -> Self {
        self.candidates = candidates;
        self
    }
}

/// Why a candidate backend was passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No configuration for this backend
    NotConfigured,
    /// Opening the backend failed
    OpenFailed(String),
    /// Opening the backend did not finish in time
    TimedOut(Duration),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotConfigured => f.write_str("not configured"),
            SkipReason::OpenFailed(e) => write!(f, "open failed: {}", e),
            SkipReason::TimedOut(after) => write!(f, "open timed out after {:?}", after),
        }
    }
}

/// Outcome of backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    /// Backend in use
    pub kind: BackendKind,
    /// Candidates tried before it, in order
    pub skipped: Vec<(BackendKind, SkipReason)>,
}

/// Result of a storage round trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Round trip completed
    Healthy,
    /// Round trip failed
    Unhealthy,
}

/// Health report of the active backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Backend in use
    pub storage_type: BackendKind,
    /// Check record was written
    pub can_write: bool,
    /// Check record was read back
    pub can_read: bool,
    /// Failure description, if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the check ran
    pub timestamp: String,
}

/// Serialized snapshot produced by [`PersistenceManager::export_data`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    /// Most recent assessments
    pub assessments: Vec<Record>,
    /// The user profile (default profile if none stored)
    pub user_profile: Record,
    /// When the snapshot was taken
    pub export_date: String,
    /// Snapshot format version
    pub version: String,
}

/// Baseline profile returned when none has been stored
pub fn default_profile() -> Record {
    let profile = json!({
        "id": PROFILE_ID,
        "riskTolerance": "moderate",
        "experienceLevel": "intermediate",
        "preferredSetupType": "balanced",
        "totalAssessments": 0,
        "averageSuccessRate": 0,
        "createdAt": now_iso(),
    });

    match profile {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn to_record<T: Serialize + ?Sized>(payload: &T) -> Result<Record> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StorageError::InvalidRecord(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(StorageError::InvalidRecord(e.to_string())),
    }
}

/// Build `{id, ...stamps}` overlaid by the payload, which may not change the id
fn stamped(id: &str, stamps: Vec<(&str, Value)>, payload: Record) -> Record {
    let mut record = Record::new();
    record.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

    for (field, value) in stamps {
        record.insert(field.to_string(), value);
    }

    for (field, value) in payload {
        if field != ID_FIELD {
            record.insert(field, value);
        }
    }

    record
}

struct ActiveBackend {
    backend: Box<dyn StorageBackend>,
    selection: BackendSelection,
}

/// Facade over the selected backend and the record cache
pub struct PersistenceManager {
    config: PersistenceConfig,
    active: OnceCell<ActiveBackend>,
    cache: RecordCache,
}

impl PersistenceManager {
    /// Create a manager; the backend is selected on first use or [`init`](Self::init)
    pub fn new(config: PersistenceConfig) -> Self {
        let cache = RecordCache::new(&config.cache);

        Self {
            config,
            active: OnceCell::new(),
            cache,
        }
    }

    /// Create a manager over an already-open backend
    pub fn with_backend(backend: impl StorageBackend + 'static, config: PersistenceConfig) -> Self {
        let cache = RecordCache::new(&config.cache);
        let selection = BackendSelection {
            kind: backend.kind(),
            skipped: Vec::new(),
        };
        let active = ActiveBackend {
            backend: Box::new(backend),
            selection,
        };

        Self {
            config,
            active: OnceCell::new_with(Some(active)),
            cache,
        }
    }

    /// Select the backend; runs at most once and never fails
    pub async fn init(&self) -> &BackendSelection {
        &self.active().await.selection
    }

    /// Backend selection outcome
    pub async fn selection(&self) -> &BackendSelection {
        self.init().await
    }

    /// Kind of the active backend
    pub async fn backend_kind(&self) -> BackendKind {
        self.init().await.kind
    }

    async fn active(&self) -> &ActiveBackend {
        self.active
            .get_or_init(|| select_backend(&self.config))
            .await
    }

    async fn backend(&self) -> &dyn StorageBackend {
        self.active().await.backend.as_ref()
    }

    async fn bounded<T, F>(&self, call: &'static str, fut: F) -> Result<std::result::Result<T, BackendError>>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        let after = self.config.operation_timeout;
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| StorageError::Timeout { call, after })
    }

    async fn write(&self, collection: Collection, record: &Record) -> Result<String> {
        let backend = self.backend().await;
        self.bounded("save", backend.save(collection, record))
            .await?
            .map_err(|source| StorageError::Write { collection, source })
    }

    async fn read(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let backend = self.backend().await;
        self.bounded("get", backend.get(collection, id))
            .await?
            .map_err(|source| StorageError::Read { collection, source })
    }

    async fn read_all(&self, collection: Collection, options: &QueryOptions) -> Result<Vec<Record>> {
        let backend = self.backend().await;
        self.bounded("get_all", backend.get_all(collection, options))
            .await?
            .map_err(|source| StorageError::Read { collection, source })
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool> {
        let backend = self.backend().await;
        self.bounded("delete", backend.delete(collection, id))
            .await?
            .map_err(|source| StorageError::Write { collection, source })
    }

    /// Apply the durability policy of `operation` to its outcome
    ///
    /// [`Durability::Required`] failures are logged and returned;
    /// [`Durability::BestEffort`] failures are logged and become `Ok(None)`.
    fn settle<T>(operation: Operation, result: Result<T>) -> Result<Option<T>> {
        match (operation.durability(), result) {
            (_, Ok(value)) => Ok(Some(value)),
            (Durability::Required, Err(e)) => {
                tracing::error!("Failed to {}: {}", operation, e);
                Err(e)
            }
            (Durability::BestEffort, Err(e)) => {
                tracing::warn!("Failed to {}: {}", operation, e);
                Ok(None)
            }
        }
    }

    /// Outcome of an operation whose public result can only signal absence
    fn settle_quietly<T>(operation: Operation, result: Result<T>) -> Option<T> {
        Self::settle(operation, result).ok().flatten()
    }

    /// Store a new assessment, returning its generated id
    ///
    /// The record gets a fresh `id`, a `timestamp` unless the payload carries
    /// one, and the schema `version`.
    pub async fn save_assessment<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let result = self.store_assessment(payload).await;
        Ok(Self::settle(Operation::SaveAssessment, result)?.unwrap_or_default())
    }

    async fn store_assessment<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let payload = to_record(payload)?;
        let id = generate_id();

        let mut record = stamped(&id, vec![("timestamp", Value::String(now_iso()))], payload);
        record.insert("version".to_string(), Value::String(SCHEMA_VERSION.to_string()));

        self.cache.put(CacheKey::Assessment(id.clone()), record.clone());
        let id = self.write(Collection::Assessments, &record).await?;

        tracing::debug!("Assessment saved: {}", id);
        Ok(id)
    }

    /// List assessments
    ///
    /// Unset options default to the 50 newest by `timestamp`. Served from the
    /// cache when it already holds at least `limit` assessments. Never fails:
    /// a backend error yields an empty list.
    pub async fn get_assessments(&self, options: &QueryOptions) -> Vec<Record> {
        let options = QueryOptions {
            limit: Some(options.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            sort_by: Some(options.sort_by.clone().unwrap_or_else(|| "timestamp".to_string())),
            order: options.order,
        };
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT);

        self.init().await;

        let cached = options.apply(self.cache.assessments());
        if cached.len() >= limit {
            tracing::debug!("Serving {} assessments from cache", cached.len());
            return cached;
        }

        match self.read_all(Collection::Assessments, &options).await {
            Ok(records) => {
                for record in &records {
                    if let Some(id) = record_id(record) {
                        self.cache.put(CacheKey::Assessment(id.to_string()), record.clone());
                    }
                }
                records
            }
            Err(e) => {
                tracing::warn!("Failed to get assessments: {}", e);
                Vec::new()
            }
        }
    }

    /// Delete one assessment; `false` if absent or on failure
    pub async fn delete_assessment(&self, id: &str) -> bool {
        let result = self.remove(Collection::Assessments, id).await;
        let removed = Self::settle_quietly(Operation::DeleteAssessment, result);

        if removed.is_some() {
            self.cache.remove(&CacheKey::Assessment(id.to_string()));
        }

        removed.unwrap_or(false)
    }

    /// Overwrite the user profile; `false` on failure
    pub async fn save_user_profile<T: Serialize + ?Sized>(&self, profile: &T) -> bool {
        let result = self.store_user_profile(profile).await;
        Self::settle_quietly(Operation::SaveUserProfile, result).is_some()
    }

    async fn store_user_profile<T: Serialize + ?Sized>(&self, profile: &T) -> Result<()> {
        let payload = to_record(profile)?;
        let record = stamped(PROFILE_ID, vec![("lastUpdated", Value::String(now_iso()))], payload);

        self.cache.put(CacheKey::UserProfile, record.clone());
        self.write(Collection::UserProfile, &record).await?;

        tracing::debug!("User profile saved");
        Ok(())
    }

    /// The stored user profile, or [`default_profile`] if none or on failure
    pub async fn get_user_profile(&self) -> Record {
        self.init().await;

        if let Some(profile) = self.cache.get(&CacheKey::UserProfile) {
            return profile;
        }

        match self.read(Collection::UserProfile, PROFILE_ID).await {
            Ok(Some(profile)) => {
                self.cache.put(CacheKey::UserProfile, profile.clone());
                profile
            }
            Ok(None) => default_profile(),
            Err(e) => {
                tracing::warn!("Failed to get user profile: {}", e);
                default_profile()
            }
        }
    }

    /// Store a new session, returning its id; `None` on failure
    pub async fn save_session<T: Serialize + ?Sized>(&self, payload: &T) -> Option<String> {
        let result = self.store_session(payload).await;
        Self::settle_quietly(Operation::SaveSession, result)
    }

    async fn store_session<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let payload = to_record(payload)?;
        let id = generate_id();
        let record = stamped(&id, vec![("startTime", Value::String(now_iso()))], payload);

        self.write(Collection::Sessions, &record).await
    }

    /// List sessions, defaulting to the 50 newest by `startTime`
    pub async fn get_sessions(&self, options: &QueryOptions) -> Vec<Record> {
        let options = QueryOptions {
            limit: Some(options.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            sort_by: Some(options.sort_by.clone().unwrap_or_else(|| "startTime".to_string())),
            order: options.order,
        };

        match self.read_all(Collection::Sessions, &options).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to get sessions: {}", e);
                Vec::new()
            }
        }
    }

    /// Store a preference value under `key`; `false` on failure
    pub async fn save_preference<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let result = self.store_preference(key, value).await;
        Self::settle_quietly(Operation::SavePreference, result).is_some()
    }

    async fn store_preference<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| StorageError::InvalidRecord(e.to_string()))?;

        let mut record = Record::new();
        record.insert(ID_FIELD.to_string(), Value::String(key.to_string()));
        record.insert("value".to_string(), value);
        record.insert("lastUpdated".to_string(), Value::String(now_iso()));

        self.cache.put(CacheKey::Preference(key.to_string()), record.clone());
        self.write(Collection::Preferences, &record).await?;
        Ok(())
    }

    async fn lookup_preference(&self, key: &str) -> Option<Value> {
        self.init().await;

        let cache_key = CacheKey::Preference(key.to_string());
        if let Some(record) = self.cache.get(&cache_key) {
            return Some(record.get("value").cloned().unwrap_or(Value::Null));
        }

        match self.read(Collection::Preferences, key).await {
            Ok(Some(record)) => {
                let value = record.get("value").cloned().unwrap_or(Value::Null);
                self.cache.put(cache_key, record);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to get preference {}: {}", key, e);
                None
            }
        }
    }

    /// Stored preference value, or `default` if absent or on failure
    pub async fn get_preference(&self, key: &str, default: Value) -> Value {
        self.lookup_preference(key).await.unwrap_or(default)
    }

    /// Typed preference value; `default` also when the stored value does not fit `T`
    pub async fn get_preference_as<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.lookup_preference(key)
            .await
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(default)
    }

    /// Serialize the newest assessments and the profile as pretty JSON
    pub async fn export_data(&self) -> Result<String> {
        let snapshot = ExportSnapshot {
            assessments: self
                .get_assessments(&QueryOptions::new().limit(EXPORT_LIMIT))
                .await,
            user_profile: self.get_user_profile().await,
            export_date: now_iso(),
            version: SCHEMA_VERSION.to_string(),
        };

        let result =
            serde_json::to_string_pretty(&snapshot).map_err(|e| StorageError::Export(e.to_string()));
        Ok(Self::settle(Operation::ExportData, result)?.unwrap_or_default())
    }

    /// Restore a snapshot produced by [`export_data`](Self::export_data)
    ///
    /// Assessments keep their ids and overwrite records with the same id.
    /// Returns the number of records written.
    pub async fn import_data(&self, snapshot: &str) -> Result<usize> {
        let result = self.restore(snapshot).await;
        Ok(Self::settle(Operation::ImportData, result)?.unwrap_or_default())
    }

    async fn restore(&self, snapshot: &str) -> Result<usize> {
        let snapshot: ExportSnapshot =
            serde_json::from_str(snapshot).map_err(|e| StorageError::Import(e.to_string()))?;

        let mut written = 0;

        for assessment in snapshot.assessments {
            let id = record_id(&assessment)
                .ok_or_else(|| StorageError::Import("assessment without an id".to_string()))?
                .to_string();

            self.cache.put(CacheKey::Assessment(id), assessment.clone());
            self.write(Collection::Assessments, &assessment).await?;
            written += 1;
        }

        let mut profile = snapshot.user_profile;
        profile.insert(ID_FIELD.to_string(), Value::String(PROFILE_ID.to_string()));
        self.cache.put(CacheKey::UserProfile, profile.clone());
        self.write(Collection::UserProfile, &profile).await?;
        written += 1;

        tracing::info!("Imported {} records", written);
        Ok(written)
    }

    /// Wipe every collection and then the cache; `false` on failure
    ///
    /// A failing backend may leave some collections cleared; the cache is
    /// kept in that case.
    pub async fn clear_all_data(&self) -> bool {
        let result = self.wipe().await;
        let cleared = Self::settle_quietly(Operation::ClearAllData, result).is_some();

        if cleared {
            self.cache.clear();
            tracing::info!("All data cleared");
        }

        cleared
    }

    async fn wipe(&self) -> Result<()> {
        let backend = self.backend().await;
        self.bounded("clear", backend.clear())
            .await?
            .map_err(StorageError::Clear)
    }

    /// Write, read back and delete a check record directly against the backend
    pub async fn health_check(&self) -> HealthReport {
        let storage_type = self.backend_kind().await;

        match self.round_trip().await {
            Ok((can_write, can_read)) => HealthReport {
                status: HealthStatus::Healthy,
                storage_type,
                can_write,
                can_read,
                error: None,
                timestamp: now_iso(),
            },
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    storage_type,
                    can_write: false,
                    can_read: false,
                    error: Some(e.to_string()),
                    timestamp: now_iso(),
                }
            }
        }
    }

    async fn round_trip(&self) -> Result<(bool, bool)> {
        let check = stamped(
            &generate_id(),
            vec![
                ("test", Value::Bool(true)),
                ("timestamp", Value::String(now_iso())),
            ],
            Record::new(),
        );

        let id = self.write(Collection::Assessments, &check).await?;
        let retrieved = self.read(Collection::Assessments, &id).await;
        let removed = self.remove(Collection::Assessments, &id).await;

        // A listing running meanwhile may have cached the check record
        self.cache.remove(&CacheKey::Assessment(id.clone()));

        let retrieved = retrieved?;
        removed?;

        Ok((!id.is_empty(), retrieved.is_some()))
    }
}

async fn select_backend(config: &PersistenceConfig) -> ActiveBackend {
    let mut skipped = Vec::new();

    for &kind in &config.candidates {
        match open_candidate(kind, config).await {
            Ok(backend) => {
                tracing::info!("Persistence manager initialized: {}", kind);
                return ActiveBackend {
                    backend,
                    selection: BackendSelection { kind, skipped },
                };
            }
            Err(reason) => {
                tracing::warn!("Skipping {} backend: {}", kind, reason);
                skipped.push((kind, reason));
            }
        }
    }

    tracing::info!("Persistence manager initialized: {} (last resort)", BackendKind::Memory);
    ActiveBackend {
        backend: Box::new(MemoryBackend::new()),
        selection: BackendSelection {
            kind: BackendKind::Memory,
            skipped,
        },
    }
}

async fn open_candidate(
    kind: BackendKind,
    config: &PersistenceConfig,
) -> std::result::Result<Box<dyn StorageBackend>, SkipReason> {
    let after = config.init_timeout;

    match kind {
        BackendKind::Memory => Ok(Box::new(MemoryBackend::new())),
        BackendKind::Database => {
            let db_config = config.database.as_ref().ok_or(SkipReason::NotConfigured)?;
            bounded_open(after, DatabaseBackend::open(db_config)).await
        }
        BackendKind::KeyValue => {
            let kv_config = config.key_value.clone().ok_or(SkipReason::NotConfigured)?;
            let open = tokio::task::spawn_blocking(move || KvBackend::open(&kv_config));

            bounded_open(after, async move {
                match open.await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await
        }
    }
}

/// Await a backend open, giving up after `after`
async fn bounded_open<B, E, F>(
    after: Duration,
    open: F,
) -> std::result::Result<Box<dyn StorageBackend>, SkipReason>
where
    B: StorageBackend + 'static,
    E: fmt::Display,
    F: Future<Output = std::result::Result<B, E>>,
{
    match tokio::time::timeout(after, open).await {
        Ok(Ok(backend)) => Ok(Box::new(backend)),
        Ok(Err(e)) => Err(SkipReason::OpenFailed(e.to_string())),
        Err(_) => Err(SkipReason::TimedOut(after)),
    }
}
