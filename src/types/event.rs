//! Incoming user interaction events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AggregateKey;

/// A single user interaction delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub user_id: i64,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form payload; carried through but never aggregated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl UserEvent {
    /// Create an event stamped with the current time
    pub fn new(user_id: i64, event_type: impl Into<String>) -> Self {
        Self {
            user_id,
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data: None,
        }
    }

    /// Attach a payload to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The aggregate key this event counts towards
    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.user_id, self.event_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_camel_case_event() {
        let line = r#"{"userId":42,"eventType":"click","timestamp":"2025-03-01T10:15:30.1234567+00:00"}"#;
        let event: UserEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.user_id, 42);
        assert_eq!(event.event_type, "click");
        assert!(event.data.is_none());
    }

    #[test]
    fn test_offset_timestamp_is_normalized_to_utc() {
        let line = r#"{"userId":1,"eventType":"hover","timestamp":"2025-03-01T12:00:00+02:00"}"#;
        let event: UserEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.timestamp.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_null_data_is_omitted_when_serializing() {
        let event = UserEvent::new(7, "hold");
        let value = serde_json::to_value(&event).unwrap();

        assert!(value.get("data").is_none());
        assert_eq!(value["userId"], 7);

        let with_data = UserEvent::new(7, "click").with_data(json!({"buttonId": "save"}));
        let value = serde_json::to_value(&with_data).unwrap();
        assert_eq!(value["data"]["buttonId"], "save");
    }
}
