//! Fixed context windows around a target message.

use crate::messages::Message;
use serde_json::Value;

/// Timestamp format used in context lines and the report.
const CONTEXT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Neighbour counts on each side of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    /// Messages preceding the target in processing order.
    pub before: usize,
    /// Messages following the target in processing order.
    pub after: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            before: 3,
            after: 2,
        }
    }
}

impl ContextWindow {
    /// Renders the neighbours of `messages[index]`, one per line.
    ///
    /// Neighbours with no text are skipped. An out-of-range index yields an
    /// empty string.
    #[must_use]
    pub fn render(&self, messages: &[&Message], index: usize) -> String {
        if index >= messages.len() {
            return String::new();
        }
        let start = index.saturating_sub(self.before);
        let end = index.saturating_add(self.after).min(messages.len() - 1);

        (start..=end)
            .filter(|&i| i != index)
            .filter_map(|i| {
                let message = messages[i];
                let text = message_text(message);
                if text.is_empty() {
                    return None;
                }
                let position = if i < index { "BEFORE" } else { "AFTER" };
                let time = message.timestamp().map_or_else(
                    || "Unknown time".to_string(),
                    |t| t.format(CONTEXT_TIME_FORMAT).to_string(),
                );
                Some(format!("[{position} - {time} - {}]: {text}", message.sender()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Message text flattened to one line.
///
/// Falls back to the entity list when the text field is empty.
#[must_use]
pub fn message_text(message: &Message) -> String {
    let mut text = message.plain_text();
    if text.is_empty() {
        text = message
            .text_entities
            .iter()
            .filter_map(|entity| entity.get("text").and_then(Value::as_str))
            .collect();
    }
    text.replace(['\n', '\r'], " ")
}
