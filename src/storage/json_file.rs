//! JSON file storage backend
//!
//! The whole table lives in one pretty-printed JSON array:
//!
//! ```text
//! [
//!   { "userId": 1, "eventType": "click", "count": 12 },
//!   { "userId": 1, "eventType": "hover", "count": 3 }
//! ]
//! ```
//!
//! Entries are sorted by `(userId, eventType)`. A save reads the file,
//! merges the deltas and atomically replaces the file while holding an
//! in-process lock. Several processes writing the same file are not
//! supported.

use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{DataStorage, StorageError, StorageResult};
use crate::types::{sum_by_key, UserEventStats};
use crate::utils::{atomic_write_with, cleanup_temp_file};

/// Default file name, resolved against the working directory
pub const DEFAULT_FILE_NAME: &str = "user_event_stats.json";

/// `user_event_stats.json` in the current working directory
pub fn default_file_path() -> PathBuf {
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(DEFAULT_FILE_NAME)
}

/// Storage backed by a single JSON file
pub struct JsonFileStorage {
    file_path: PathBuf,
    /// Serializes whole read-merge-write cycles within this process
    file_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Create a storage for the given file path
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            file_lock: Mutex::new(()),
        }
    }

    /// Get the storage file path
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Run blocking file work off the async executor
    async fn run_blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> StorageResult<T> + Send + 'static,
    {
        let path = self.file_path.clone();
        tokio::task::spawn_blocking(move || f(path))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn initialize_file(path: &Path) -> StorageResult<bool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if cleanup_temp_file(path)? {
        warn!(path = %path.display(), "Removed leftover temp file from an interrupted save");
    }

    if path.exists() {
        return Ok(false);
    }

    atomic_write_with(path, |file| file.write_all(b"[]"))?;
    Ok(true)
}

fn read_stats(path: &Path) -> StorageResult<Vec<UserEventStats>> {
    let reader = BufReader::new(File::open(path)?);
    let stats: Option<Vec<UserEventStats>> = serde_json::from_reader(reader)?;
    Ok(stats.unwrap_or_default())
}

/// Additive merge of `deltas` into `existing`, sorted by key
fn merge_stats(existing: Vec<UserEventStats>, deltas: &[UserEventStats]) -> Vec<UserEventStats> {
    sum_by_key(existing.iter().chain(deltas))
}

fn write_stats(path: &Path, stats: &[UserEventStats]) -> StorageResult<()> {
    atomic_write_with(path, |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, stats)?;
        writer.flush()
    })?;
    Ok(())
}

#[async_trait]
impl DataStorage for JsonFileStorage {
    fn name(&self) -> &'static str {
        "json_file"
    }

    async fn initialize(&self) -> StorageResult<()> {
        let _guard = self.file_lock.lock().await;
        info!(path = %self.file_path.display(), "Initializing JSON file storage...");

        match self.run_blocking(|path| initialize_file(&path)).await {
            Ok(true) => {
                info!("JSON file storage initialized successfully");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to initialize JSON file storage");
                Err(e)
            }
        }
    }

    fn get_stats(&self) -> BoxStream<'_, StorageResult<UserEventStats>> {
        Box::pin(async_stream::try_stream! {
            let _guard = self.file_lock.lock().await;
            let mut stats = self.run_blocking(|path| read_stats(&path)).await?;
            stats.sort_by(|a, b| {
                a.user_id
                    .cmp(&b.user_id)
                    .then_with(|| a.event_type.cmp(&b.event_type))
            });

            for stat in stats {
                yield stat;
            }
        })
    }

    async fn save_stats(&self, stats: &[UserEventStats]) -> StorageResult<()> {
        let _guard = self.file_lock.lock().await;
        let deltas = stats.to_vec();

        let result = self
            .run_blocking(move |path| {
                let existing = read_stats(&path)?;
                let merged = merge_stats(existing, &deltas);
                write_stats(&path, &merged)
            })
            .await;

        if let Err(e) = &result {
            error!(error = %e, "Failed to save statistics to JSON file storage");
        }
        result
    }
}
