//! Data types for the event statistics pipeline
//!
//! This module contains the records exchanged between the transport, the
//! in-memory aggregator and the storage backends.

mod event;
mod stats;

pub use event::UserEvent;
pub use stats::{sum_by_key, AggregateKey, UserEventStats};

/// Sum of the counts in a batch of stats
pub fn total_count(stats: &[UserEventStats]) -> i64 {
    stats.iter().map(|s| s.count).sum()
}
