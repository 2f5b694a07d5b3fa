//! Saved-message records.

use chrono::{NaiveDateTime, Utc, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format of the `date` field.
pub const MESSAGE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One archived message in chat-export form.
///
/// Fields the crate does not interpret are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable message identifier; the only deduplication key.
    pub id: i64,
    /// Record kind, normally `message`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Local timestamp, `%Y-%m-%dT%H:%M:%S`.
    pub date: String,
    /// Unix seconds as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_unixtime: Option<String>,
    /// Sender display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Sender identifier, `user{N}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_id: Option<String>,
    /// Either a plain string or a list of strings and entity objects.
    #[serde(default = "empty_text")]
    pub text: Value,
    /// Formatting entities.
    #[serde(default)]
    pub text_entities: Vec<Value>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_kind() -> String {
    "message".to_string()
}

fn empty_text() -> Value {
    Value::String(String::new())
}

impl Message {
    /// Builds a plain-text message.
    #[must_use]
    pub fn new(id: i64, date: NaiveDateTime, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id,
            kind: default_kind(),
            date: date.format(MESSAGE_DATE_FORMAT).to_string(),
            date_unixtime: Some(Utc.from_utc_datetime(&date).timestamp().to_string()),
            from: None,
            from_id: None,
            text_entities: vec![serde_json::json!({"type": "plain", "text": text})],
            text: Value::String(text),
            extra: Map::new(),
        }
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_sender(mut self, name: impl Into<String>, from_id: impl Into<String>) -> Self {
        self.from = Some(name.into());
        self.from_id = Some(from_id.into());
        self
    }

    /// Parsed `date`, if well-formed.
    #[must_use]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date, MESSAGE_DATE_FORMAT).ok()
    }

    /// Text content with entity lists flattened to a string.
    #[must_use]
    pub fn plain_text(&self) -> String {
        match &self.text {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect(),
            _ => String::new(),
        }
    }

    /// Sender name, or `Unknown`.
    #[must_use]
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or("Unknown")
    }

    /// Ordering key: timestamp, then id.
    #[must_use]
    pub fn sort_key(&self) -> (Option<NaiveDateTime>, i64) {
        (self.timestamp(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_deserialize_export_message_preserves_extras() {
        let raw = r#"{
            "id": 42,
            "type": "message",
            "date": "2025-03-01T10:15:00",
            "date_unixtime": "1740824100",
            "from": "Ada",
            "from_id": "user123",
            "forwarded_from": "Channel",
            "text": ["Read ", {"type": "link", "text": "this"}],
            "text_entities": []
        }"#;
        let message: Message = serde_json::from_str(raw).unwrap();

        assert_eq!(message.id, 42);
        assert_eq!(message.plain_text(), "Read this");
        assert_eq!(message.extra.get("forwarded_from"), Some(&Value::from("Channel")));
        assert_eq!(
            message.timestamp(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(10, 15, 0)
        );

        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["forwarded_from"], "Channel");
        assert_eq!(back["from_id"], "user123");
    }

    #[test]
    fn test_new_message_shape() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let message = Message::new(7, date, "hello").with_sender("Ada", "user9");

        assert_eq!(message.date, "2025-03-01T00:00:00");
        assert_eq!(message.date_unixtime.as_deref(), Some("1740787200"));
        assert_eq!(message.plain_text(), "hello");
        assert_eq!(message.sender(), "Ada");
    }

    #[test]
    fn test_bad_date_has_no_timestamp() {
        let mut message = Message::new(1, NaiveDateTime::default(), "x");
        message.date = "yesterday".to_string();
        assert!(message.timestamp().is_none());
    }
}
