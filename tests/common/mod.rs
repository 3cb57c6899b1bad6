//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use event_stats::storage::{StorageError, StorageResult};
use event_stats::types::{sum_by_key, total_count};
use event_stats::{DataStorage, UserEventStats};

/// In-memory storage that records every saved batch
#[derive(Default)]
pub struct RecordingStorage {
    batches: Mutex<Vec<Vec<UserEventStats>>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successfully saved batches, in order
    pub fn batches(&self) -> Vec<Vec<UserEventStats>> {
        self.batches.lock().clone()
    }

    /// Save calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Totals across all saved batches, sorted by key
    pub fn totals(&self) -> Vec<UserEventStats> {
        let batches = self.batches.lock();
        sum_by_key(batches.iter().flatten())
    }

    pub fn total_events(&self) -> i64 {
        total_count(&self.totals())
    }
}

#[async_trait]
impl DataStorage for RecordingStorage {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    fn get_stats(&self) -> BoxStream<'_, StorageResult<UserEventStats>> {
        stream::iter(self.totals().into_iter().map(Ok)).boxed()
    }

    async fn save_stats(&self, stats: &[UserEventStats]) -> StorageResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "storage unavailable",
            )));
        }
        self.batches.lock().push(stats.to_vec());
        Ok(())
    }
}

/// One JSON-lines message
pub fn event_line(user_id: i64, event_type: &str) -> String {
    format!(
        r#"{{"userId":{},"eventType":"{}","timestamp":"2025-03-01T12:00:00Z"}}"#,
        user_id, event_type
    )
}
