//! Ephemeral push envelope sent over live WebSocket connections.
//!
//! Mirrors a persisted notification's content but has no identity of its own
//! and is never retried. The JSON shape is identical whether delivered live
//! or reconstructed from a stored record, so clients use one decoder for both.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::Notification;

/// Wire shape: `{ event, type, message, data, timestamp }` with an RFC-3339
/// timestamp. `event` and `type` both carry the category tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: String,
    #[serde(rename = "type")]
    pub category: String,
    pub message: String,
    pub data: Option<Value>,
    pub timestamp: String,
}

impl PushMessage {
    pub fn new(category: &str, message: &str, data: Option<Value>, timestamp: &str) -> Self {
        Self {
            event: category.to_string(),
            category: category.to_string(),
            message: message.to_string(),
            data,
            timestamp: timestamp.to_string(),
        }
    }

    /// Rebuild the envelope from a durable record, for clients replaying
    /// missed events through the listing endpoint.
    pub fn from_record(record: &Notification) -> Self {
        let data = record
            .data
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self::new(&record.category, &record.message, data, &record.timestamp)
    }

    /// Serialize into a WebSocket text frame.
    pub fn to_ws_message(&self) -> Message {
        // PushMessage serialization cannot fail: all fields are JSON-native.
        let json = serde_json::to_string(self).unwrap_or_default();
        Message::Text(json.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_field_names() {
        let push = PushMessage::new(
            "new_installation",
            "New installation: Acme",
            Some(json!({"id": 7})),
            "2026-08-29T10:00:00+00:00",
        );
        let value: Value = serde_json::from_str(&serde_json::to_string(&push).unwrap()).unwrap();

        assert_eq!(value["event"], "new_installation");
        assert_eq!(value["type"], "new_installation");
        assert_eq!(value["message"], "New installation: Acme");
        assert_eq!(value["data"]["id"], 7);
        assert_eq!(value["timestamp"], "2026-08-29T10:00:00+00:00");
    }

    #[test]
    fn record_reconstruction_matches_live_shape() {
        let record = Notification {
            id: 1,
            user_id: 2,
            message: "Follow-up due today: Acme".to_string(),
            category: "sales_followup_due".to_string(),
            data: Some(r#"{"lead_id":3}"#.to_string()),
            is_read: false,
            timestamp: "2026-08-29T10:00:00+00:00".to_string(),
        };
        let live = PushMessage::new(
            "sales_followup_due",
            "Follow-up due today: Acme",
            Some(json!({"lead_id": 3})),
            "2026-08-29T10:00:00+00:00",
        );

        let rebuilt = PushMessage::from_record(&record);
        assert_eq!(
            serde_json::to_value(&rebuilt).unwrap(),
            serde_json::to_value(&live).unwrap()
        );
    }
}
