//! Lifelog API client.

use super::DateWindow;
use crate::config::LifelogConfig;
use crate::llm::{LlmHttpConfig, build_http_client};
use crate::resilience::http::{check_status, send_error};
use crate::watermark::DATE_FORMAT;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

/// Entries requested per call.
pub const PAGE_LIMIT: u32 = 100;

/// Something that returns lifelog entries for a date window.
pub trait LifelogSource {
    /// Fetches the raw JSON for `window`.
    ///
    /// # Errors
    ///
    /// Returns transient errors for retryable transport failures and
    /// [`Error::OperationFailed`] otherwise.
    fn fetch(&self, window: DateWindow) -> Result<Value>;
}

impl<T: LifelogSource + ?Sized> LifelogSource for &T {
    fn fetch(&self, window: DateWindow) -> Result<Value> {
        (**self).fetch(window)
    }
}

impl<T: LifelogSource + ?Sized> LifelogSource for Box<T> {
    fn fetch(&self, window: DateWindow) -> Result<Value> {
        (**self).fetch(window)
    }
}

/// HTTP client for the lifelog API.
pub struct LifelogClient {
    endpoint: String,
    api_key: SecretString,
    timezone: String,
    client: reqwest::blocking::Client,
}

impl LifelogClient {
    /// Creates a client.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: SecretString, timezone: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timezone: timezone.into(),
            client: build_http_client(LlmHttpConfig {
                timeout_ms: 60_000,
                connect_timeout_ms: 5_000,
            }),
        }
    }

    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if no API key is configured.
    pub fn from_config(config: &LifelogConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                Error::Precondition("no lifelog API key configured (set LIMITLESS_API_KEY)".to_string())
            })?;
        Ok(Self::new(&config.endpoint, api_key, &config.timezone))
    }

    fn query(&self, window: DateWindow) -> [(&'static str, String); 4] {
        [
            ("start", window.start.format(DATE_FORMAT).to_string()),
            ("end", window.end.format(DATE_FORMAT).to_string()),
            ("timezone", self.timezone.clone()),
            ("limit", PAGE_LIMIT.to_string()),
        ]
    }
}

impl LifelogSource for LifelogClient {
    #[tracing::instrument(skip(self), fields(start = %window.start, end = %window.end))]
    fn fetch(&self, window: DateWindow) -> Result<Value> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.query(window))
            .header("X-API-Key", self.api_key.expose_secret())
            .send()
            .map_err(|e| send_error("fetch_lifelogs", &e))?;
        let response = check_status("fetch_lifelogs", response)?;

        response
            .json()
            .map_err(|e| Error::failed("decode_lifelogs", e))
    }
}
