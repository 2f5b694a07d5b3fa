//! LLM client abstraction.
//!
//! Journal summaries and message classification only need plain text in, plain
//! text out, so the provider surface is a single `complete` call. Retries are
//! applied by the caller through [`complete_with_retry`].

mod ollama;

pub use ollama::OllamaClient;

use crate::resilience::{RetryPolicy, Shutdown};
use crate::Result;
use std::time::Duration;

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transient`] for timeouts, connect failures and
    /// 5xx responses, [`crate::Error::OperationFailed`] otherwise.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Whether the provider is reachable right now.
    fn is_available(&self) -> bool {
        true
    }
}

/// Runs `complete` under the retry policy.
///
/// # Errors
///
/// Returns the last error once the policy gives up, or
/// [`crate::Error::Cancelled`] if shutdown interrupts a backoff.
pub fn complete_with_retry(
    provider: &dyn LlmProvider,
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    prompt: &str,
) -> Result<String> {
    let started = std::time::Instant::now();
    let result = policy.run("llm_complete", shutdown, |attempt| {
        tracing::debug!(provider = provider.name(), attempt, "Requesting completion");
        provider.complete(prompt)
    });
    metrics::histogram!("daybook_llm_duration_ms", "provider" => provider.name())
        .record(started.elapsed().as_secs_f64() * 1000.0);
    result
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }
}

/// Builds a blocking HTTP client with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    struct Flaky {
        failures_left: Mutex<u32>,
    }

    impl LlmProvider for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(Error::Transient {
                    operation: "flaky".to_string(),
                    cause: "timeout".to_string(),
                });
            }
            Ok(format!("echo: {prompt}"))
        }
    }

    #[test]
    fn test_complete_with_retry_recovers() {
        let provider = Flaky {
            failures_left: Mutex::new(2),
        };
        let text = complete_with_retry(
            &provider,
            &RetryPolicy::immediate(3),
            &Shutdown::new(),
            "hi",
        )
        .unwrap();
        assert_eq!(text, "echo: hi");
    }

    #[test]
    fn test_complete_with_retry_gives_up() {
        let provider = Flaky {
            failures_left: Mutex::new(5),
        };
        let result = complete_with_retry(
            &provider,
            &RetryPolicy::immediate(2),
            &Shutdown::new(),
            "hi",
        );
        assert!(result.unwrap_err().is_transient());
    }

    #[test]
    fn test_http_config_from_config() {
        let config = crate::config::LlmConfig {
            timeout_ms: Some(5_000),
            ..crate::config::LlmConfig::default()
        };
        let http = LlmHttpConfig::from_config(&config);
        assert_eq!(http.timeout_ms, 5_000);
        assert_eq!(http.connect_timeout_ms, 3_000);
    }
}
