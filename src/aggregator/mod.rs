//! Stats Aggregator - live in-memory counters
//!
//! Keeps one running count per (user, event type) pair. The map is shared
//! between the delivery path, which increments on every event, and the
//! flush path, which snapshots the counts and later subtracts exactly what
//! it managed to persist.
//!
//! # Flush cycle
//!
//! ```text
//! record_event ──► count += 1            (any time, any thread)
//! snapshot()   ──► [(key, n), ...]       (counts > 0 only)
//! save_stats   ──► storage += n
//! remove_exact ──► count -= n            (events recorded since the
//!                                         snapshot stay in the map)
//! ```
//!
//! Entries are never deleted. A key whose count dropped back to zero stays
//! in the map and is skipped by snapshots.

use dashmap::DashMap;

use crate::types::{AggregateKey, UserEvent, UserEventStats};

/// Thread-safe running counts keyed by [`AggregateKey`]
#[derive(Debug, Default)]
pub struct StatsAggregator {
    counts: DashMap<AggregateKey, i64>,
}

impl StatsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event towards its (user, event type) key
    pub fn record_event(&self, event: &UserEvent) {
        // The entry guard holds the shard write lock, so the increment is atomic.
        *self.counts.entry(event.key()).or_insert(0) += 1;
    }

    /// Point-in-time view of every key with a positive count
    ///
    /// Each entry is read under its shard lock; keys updated while the
    /// snapshot is being taken may or may not be included. Sorted by key.
    pub fn snapshot(&self) -> Vec<UserEventStats> {
        let mut stats: Vec<UserEventStats> = self
            .counts
            .iter()
            .filter(|entry| *entry.value() > 0)
            .map(|entry| {
                let key = entry.key();
                UserEventStats::new(key.user_id, key.event_type.clone(), *entry.value())
            })
            .collect();

        stats.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| a.event_type.cmp(&b.event_type))
        });
        stats
    }

    /// Subtract previously snapshotted counts
    ///
    /// Each key is decremented by exactly the amount in `stats`, never reset,
    /// so increments that arrived after the snapshot carry over to the next
    /// flush. A key missing from the map is inserted with the negated amount.
    pub fn remove_exact(&self, stats: &[UserEventStats]) {
        for stat in stats {
            *self.counts.entry(stat.key()).or_insert(0) -= stat.count;
        }
    }

    /// Current count for a key (zero if never seen)
    pub fn count(&self, key: &AggregateKey) -> i64 {
        self.counts.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Number of keys tracked, including keys at zero
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no key has ever been recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of events waiting to be flushed
    pub fn pending_events(&self) -> i64 {
        self.counts
            .iter()
            .map(|entry| *entry.value())
            .filter(|count| *count > 0)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn event(user_id: i64, event_type: &str) -> UserEvent {
        UserEvent::new(user_id, event_type)
    }

    #[test]
    fn test_snapshot_groups_by_key() {
        let aggregator = StatsAggregator::new();
        aggregator.record_event(&event(1, "click"));
        aggregator.record_event(&event(1, "click"));
        aggregator.record_event(&event(2, "hover"));

        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot,
            vec![
                UserEventStats::new(1, "click", 2),
                UserEventStats::new(2, "hover", 1),
            ]
        );
    }

    #[test]
    fn test_remove_exact_drives_count_to_zero() {
        let aggregator = StatsAggregator::new();
        for _ in 0..5 {
            aggregator.record_event(&event(3, "hold"));
        }

        let snapshot = aggregator.snapshot();
        aggregator.remove_exact(&snapshot);

        assert_eq!(aggregator.count(&AggregateKey::new(3, "hold")), 0);
        assert!(aggregator.snapshot().is_empty());
        // Zero entries stay in the map but are never reported
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_event_between_snapshot_and_remove_survives() {
        let aggregator = StatsAggregator::new();
        aggregator.record_event(&event(1, "click"));
        aggregator.record_event(&event(1, "click"));

        let snapshot = aggregator.snapshot();
        aggregator.record_event(&event(1, "click"));
        aggregator.remove_exact(&snapshot);

        assert_eq!(aggregator.count(&AggregateKey::new(1, "click")), 1);
        assert_eq!(aggregator.snapshot(), vec![UserEventStats::new(1, "click", 1)]);
    }

    #[test]
    fn test_remove_unknown_key_inserts_negative_entry() {
        let aggregator = StatsAggregator::new();
        aggregator.remove_exact(&[UserEventStats::new(9, "click", 2)]);

        assert!(aggregator.snapshot().is_empty());

        aggregator.record_event(&event(9, "click"));
        aggregator.record_event(&event(9, "click"));
        aggregator.record_event(&event(9, "click"));
        assert_eq!(aggregator.snapshot(), vec![UserEventStats::new(9, "click", 1)]);
    }

    #[test]
    fn test_pending_events() {
        let aggregator = StatsAggregator::new();
        assert!(aggregator.is_empty());

        aggregator.record_event(&event(1, "click"));
        aggregator.record_event(&event(2, "click"));
        aggregator.record_event(&event(2, "hover"));

        assert_eq!(aggregator.pending_events(), 3);
    }

    #[test]
    fn test_concurrent_increments_with_flush_cycles() {
        let aggregator = Arc::new(StatsAggregator::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        aggregator.record_event(&event(i % 2, "click"));
                    }
                })
            })
            .collect();

        let mut flushed = 0;
        for _ in 0..50 {
            let snapshot = aggregator.snapshot();
            flushed += snapshot.iter().map(|s| s.count).sum::<i64>();
            aggregator.remove_exact(&snapshot);
        }

        for writer in writers {
            writer.join().unwrap();
        }

        let remaining: i64 = aggregator.snapshot().iter().map(|s| s.count).sum();
        assert_eq!(flushed + remaining, 4_000);
    }
}
