//! Aggregate keys and persisted counter records

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one running counter: a (user, event type) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    pub user_id: i64,
    pub event_type: String,
}

impl AggregateKey {
    pub fn new(user_id: i64, event_type: impl Into<String>) -> Self {
        Self {
            user_id,
            event_type: event_type.into(),
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.user_id, self.event_type)
    }
}

/// Count for one aggregate key.
///
/// Produced by aggregator snapshots and exchanged with storage. In a save
/// request `count` is the amount to add to the stored total, not a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEventStats {
    pub user_id: i64,
    pub event_type: String,
    pub count: i64,
}

impl UserEventStats {
    pub fn new(user_id: i64, event_type: impl Into<String>, count: i64) -> Self {
        Self {
            user_id,
            event_type: event_type.into(),
            count,
        }
    }

    /// The aggregate key of this record
    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.user_id, self.event_type.clone())
    }
}

/// Sum counts sharing a key, returning one record per key sorted by key
pub fn sum_by_key<'a, I>(stats: I) -> Vec<UserEventStats>
where
    I: IntoIterator<Item = &'a UserEventStats>,
{
    let mut totals: BTreeMap<AggregateKey, i64> = BTreeMap::new();
    for stat in stats {
        *totals.entry(stat.key()).or_insert(0) += stat.count;
    }

    totals
        .into_iter()
        .map(|(key, count)| UserEventStats::new(key.user_id, key.event_type, count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering_is_user_then_type() {
        let mut keys = vec![
            AggregateKey::new(2, "click"),
            AggregateKey::new(1, "hover"),
            AggregateKey::new(1, "click"),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                AggregateKey::new(1, "click"),
                AggregateKey::new(1, "hover"),
                AggregateKey::new(2, "click"),
            ]
        );
    }

    #[test]
    fn test_stats_json_layout() {
        let stat = UserEventStats::new(5, "click", 3);
        let json = serde_json::to_string(&stat).unwrap();

        assert_eq!(json, r#"{"userId":5,"eventType":"click","count":3}"#);
    }
}
