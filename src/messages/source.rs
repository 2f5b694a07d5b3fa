//! Where new messages come from.

use super::models::{MESSAGE_DATE_FORMAT, Message};
use crate::config::MessagesConfig;
use crate::llm::{LlmHttpConfig, build_http_client};
use crate::resilience::http::{check_status, send_error};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

/// One page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Page size.
    pub limit: usize,
    /// Items to skip, newest first.
    pub offset: usize,
    /// Only items after this timestamp, when the source supports it.
    pub since: Option<NaiveDateTime>,
}

/// A paginated, newest-first message history.
pub trait MessageSource {
    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] when the source asks for a pause,
    /// [`Error::Transient`] for retryable transport failures, and
    /// [`Error::OperationFailed`] otherwise.
    fn fetch_batch(&self, request: &FetchRequest) -> Result<Vec<Message>>;
}

/// Message-history API over HTTP with bearer authentication.
pub struct HttpMessageSource {
    endpoint: String,
    token: SecretString,
    client: reqwest::blocking::Client,
}

impl HttpMessageSource {
    /// Creates a source for `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
            client: build_http_client(LlmHttpConfig {
                timeout_ms: 30_000,
                connect_timeout_ms: 5_000,
            }),
        }
    }

    /// Creates a source from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if the endpoint or token is missing.
    pub fn from_config(config: &MessagesConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            Error::Precondition(
                "no message endpoint configured (set DAYBOOK_MESSAGES_ENDPOINT or [messages].endpoint)"
                    .to_string(),
            )
        })?;
        let token = config.token.clone().ok_or_else(|| {
            Error::Precondition(
                "no message token configured (set DAYBOOK_MESSAGES_TOKEN)".to_string(),
            )
        })?;
        Ok(Self::new(endpoint, token))
    }
}

impl MessageSource for HttpMessageSource {
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    fn fetch_batch(&self, request: &FetchRequest) -> Result<Vec<Message>> {
        let mut query = vec![
            ("limit", request.limit.to_string()),
            ("offset", request.offset.to_string()),
        ];
        if let Some(since) = request.since {
            query.push(("since", since.format(MESSAGE_DATE_FORMAT).to_string()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .bearer_auth(self.token.expose_secret())
            .send()
            .map_err(|e| send_error("fetch_messages", &e))?;
        let response = check_status("fetch_messages", response)?;

        let body: Value = response
            .json()
            .map_err(|e| Error::failed("decode_messages", e))?;
        parse_page(body)
    }
}

/// Accepts either a bare array or `{ "messages": [...] }`.
fn parse_page(body: Value) -> Result<Vec<Message>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("messages") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(Error::failed(
                    "decode_messages",
                    format!("'messages' is not a list: {other}"),
                ));
            },
        },
        other => {
            return Err(Error::failed(
                "decode_messages",
                format!("unexpected response body: {other}"),
            ));
        },
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| Error::failed("decode_messages", e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_json(id: i64) -> Value {
        json!({"id": id, "type": "message", "date": "2025-03-01T10:00:00", "text": "hi"})
    }

    #[test]
    fn test_parse_page_accepts_both_shapes() {
        let bare = parse_page(json!([message_json(1), message_json(2)])).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = parse_page(json!({"messages": [message_json(3)]})).unwrap();
        assert_eq!(wrapped[0].id, 3);

        assert!(parse_page(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_page_rejects_garbage() {
        assert!(parse_page(json!("nope")).is_err());
        assert!(parse_page(json!({"messages": 5})).is_err());
        assert!(parse_page(json!([{"text": "no id"}])).is_err());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = MessagesConfig::default();
        let err = HttpMessageSource::from_config(&config).err().unwrap();
        assert_eq!(err.exit_code(), 2);

        let config = MessagesConfig {
            endpoint: Some("http://127.0.0.1:9/messages".to_string()),
            token: Some(SecretString::from("t0ken")),
            ..MessagesConfig::default()
        };
        assert!(HttpMessageSource::from_config(&config).is_ok());
    }
}
