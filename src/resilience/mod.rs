//! Retry, cancellation, and polling cadence shared by every network flow.
//!
//! All remote calls (the Ollama generate endpoint, the message-history API, the
//! lifelog API) go through one [`RetryPolicy`]. Long-running loops sleep through
//! a [`Shutdown`] handle so Ctrl-C interrupts them promptly, and monitor mode
//! paces itself with a [`PollSchedule`].

pub mod http;
mod schedule;
mod shutdown;

pub use schedule::PollSchedule;
pub use shutdown::Shutdown;

use crate::{Error, Result};
use std::time::Duration;

/// Retry settings for transient remote failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Random spread as a fraction of the delay (0.2 means ±20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Loads the policy from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::RetryConfig) -> Self {
        let mut policy = Self::default();
        if let Some(max_attempts) = config.max_attempts {
            policy.max_attempts = max_attempts.max(1);
        }
        if let Some(base_delay_ms) = config.base_delay_ms {
            policy.base_delay = Duration::from_millis(base_delay_ms);
        }
        if let Some(max_delay_ms) = config.max_delay_ms {
            policy.max_delay = Duration::from_millis(max_delay_ms);
        }
        if let Some(jitter) = config.jitter {
            policy.jitter = jitter.clamp(0.0, 1.0);
        }
        policy
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("DAYBOOK_RETRY_MAX_ATTEMPTS") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.max_attempts = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("DAYBOOK_RETRY_BASE_DELAY_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.base_delay = Duration::from_millis(parsed);
            }
        }
        self
    }

    /// A policy that never waits, for tests and dry runs.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Deterministic backoff before retry number `retry` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = (self.base_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Backoff with jitter applied, still capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let spread = self.jitter.min(1.0);
        let factor = 2.0f64.mul_add(spread * rand::random::<f64>(), 1.0 - spread);
        base.mul_f64(factor).min(self.max_delay)
    }

    /// Runs `call` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// [`Error::Transient`] failures back off exponentially. [`Error::RateLimited`]
    /// failures wait the server's `retry_after` instead. Both count against
    /// `max_attempts`; anything else is returned untouched. The attempt number
    /// (1-based) is passed to `call`.
    pub fn run<T, F>(&self, operation: &'static str, shutdown: &Shutdown, call: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.run_inner(operation, shutdown, true, call)
    }

    /// Like [`run`](Self::run), but hands [`Error::RateLimited`] straight back
    /// so the caller can apply its own rate-limit budget.
    pub fn run_transient<T, F>(
        &self,
        operation: &'static str,
        shutdown: &Shutdown,
        call: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.run_inner(operation, shutdown, false, call)
    }

    fn run_inner<T, F>(
        &self,
        operation: &'static str,
        shutdown: &Shutdown,
        wait_on_rate_limit: bool,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match call(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = match err.retry_after() {
                Some(wait) if wait_on_rate_limit => wait,
                Some(_) => return Err(err),
                None if err.is_transient() => self.delay_for(attempt),
                None => return Err(err),
            };
            if attempt >= max_attempts {
                metrics::counter!("daybook_retries_exhausted_total", "operation" => operation)
                    .increment(1);
                tracing::error!(
                    operation = operation,
                    attempts = attempt,
                    error = %err,
                    "Giving up after transient failures"
                );
                return Err(err);
            }

            metrics::counter!("daybook_retries_total", "operation" => operation).increment(1);
            tracing::warn!(
                operation = operation,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying after transient failure"
            );
            if !shutdown.sleep(delay) {
                return Err(Error::Cancelled);
            }
        }
    }
}
