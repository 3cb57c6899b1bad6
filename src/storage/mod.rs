//! Durable storage for aggregated counters
//!
//! Every backend implements the same additive-merge contract:
//!
//! - `initialize` prepares the target and is safe to call on every start
//! - `get_stats` lazily enumerates totals ordered by user id, then event type
//! - `save_stats` adds each delta to the stored total for its key, as a
//!   single all-or-nothing unit from the caller's point of view
//!
//! Saves are not idempotent. A batch that is applied twice is counted
//! twice, so a save whose outcome is unknown (for example a commit whose
//! acknowledgement was lost) and is then retried produces an over-count.

mod json_file;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::types::UserEventStats;
use crate::utils::AtomicError;

pub use json_file::{default_file_path, JsonFileStorage, DEFAULT_FILE_NAME};
pub use postgres::PostgresStorage;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Atomic write failed: {0}")]
    Atomic(#[from] AtomicError),
    #[error("Storage task failed: {0}")]
    Task(String),
    #[error("Storage misconfigured: {0}")]
    Config(String),
}

/// Durable target for counter deltas
#[async_trait]
pub trait DataStorage: Send + Sync {
    /// Backend name used in log messages
    fn name(&self) -> &'static str;

    /// Idempotent setup of the durable target
    async fn initialize(&self) -> StorageResult<()>;

    /// Stream all persisted totals, ascending by user id then event type
    ///
    /// The stream is finite and one-shot; call again to re-read.
    fn get_stats(&self) -> BoxStream<'_, StorageResult<UserEventStats>>;

    /// Add every delta in `stats` to its stored total
    async fn save_stats(&self, stats: &[UserEventStats]) -> StorageResult<()>;
}

/// Open the backend selected by configuration
///
/// The returned storage still has to be initialized.
pub async fn open_storage(config: &StorageConfig) -> StorageResult<Arc<dyn DataStorage>> {
    let storage: Arc<dyn DataStorage> = match config.storage_type {
        StorageType::JsonFile => Arc::new(JsonFileStorage::new(&config.file_path)),
        StorageType::Postgres => {
            let url = config.postgres_url.as_deref().ok_or_else(|| {
                StorageError::Config("postgres storage requires a connection string".to_string())
            })?;
            Arc::new(PostgresStorage::connect(url, config.batch_size).await?)
        }
    };

    info!(backend = storage.name(), "Opened data storage");
    Ok(storage)
}

/// Collect a storage stream into memory
pub async fn collect_stats(storage: &dyn DataStorage) -> StorageResult<Vec<UserEventStats>> {
    use futures::TryStreamExt;

    storage.get_stats().try_collect().await
}
