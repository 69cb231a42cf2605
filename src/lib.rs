//! EMA dashboard application core
//!
//! Startup path of the dashboard: logging, configuration, and the single
//! [`PersistenceManager`] shared by every page.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use storage;
use storage::{DatabaseConfig, KvConfig, PersistenceConfig, PersistenceManager};

/// File name of the SQLite database inside the data directory
pub const DATABASE_FILE: &str = "ema_dashboard.db";

/// Directory name of the key-value store inside the data directory
pub const KV_DIR: &str = "ema_dashboard_kv";

/// Application startup errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Data directory could not be created
    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        /// Directory that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

/// Result type for application startup
pub type Result<T> = std::result::Result<T, AppError>;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where durable data lives; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Bound on each storage backend call
    pub operation_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_filter: "info".to_string(),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Create a new configuration with no data directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the fallback log filter
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the storage call timeout
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Persistence configuration derived from this application configuration
    pub fn persistence(&self) -> PersistenceConfig {
        match &self.data_dir {
            Some(dir) => PersistenceConfig::new()
                .database(DatabaseConfig::new(path_string(&dir.join(DATABASE_FILE))))
                .key_value(KvConfig::new(path_string(&dir.join(KV_DIR))))
                .operation_timeout(self.operation_timeout),
            None => PersistenceConfig::in_memory().operation_timeout(self.operation_timeout),
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `filter`. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_tracing(filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Shared application state
#[derive(Clone)]
pub struct AppContext {
    /// The one persistence manager of the process
    pub persistence: Arc<PersistenceManager>,
}

impl AppContext {
    /// Initialize logging and storage
    ///
    /// Storage selection itself never fails; the worst case is the in-memory
    /// backend, reported through the selection log and
    /// [`PersistenceManager::selection`].
    pub async fn start(config: AppConfig) -> Result<Self> {
        init_tracing(&config.log_filter);

        if let Some(dir) = &config.data_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| AppError::DataDir {
                    path: dir.clone(),
                    source,
                })?;
        }

        let persistence = Arc::new(PersistenceManager::new(config.persistence()));
        let selection = persistence.init().await;

        tracing::info!(
            "Storage ready: {} ({} candidates skipped)",
            selection.kind,
            selection.skipped.len()
        );

        Ok(Self { persistence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::BackendKind;

    #[test]
    fn test_persistence_config_with_data_dir() {
        let config = AppConfig::new().data_dir("/var/lib/ema").persistence();

        let db = config.database.unwrap();
        assert!(db.path.ends_with(DATABASE_FILE));
        let kv = config.key_value.unwrap();
        assert!(kv.path.ends_with(KV_DIR));
        assert_eq!(
            config.candidates,
            vec![BackendKind::Database, BackendKind::KeyValue, BackendKind::Memory]
        );
    }

    #[test]
    fn test_persistence_config_without_data_dir() {
        let config = AppConfig::new()
            .operation_timeout(Duration::from_secs(2))
            .persistence();

        assert!(config.database.is_none());
        assert!(config.key_value.is_none());
        assert_eq!(config.candidates, vec![BackendKind::Memory]);
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing("debug");
        init_tracing("info");
    }

    #[tokio::test]
    async fn test_start_in_memory() {
        let ctx = AppContext::start(AppConfig::new()).await.unwrap();
        assert_eq!(ctx.persistence.backend_kind().await, BackendKind::Memory);
    }
}
