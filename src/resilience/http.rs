//! Maps HTTP failures onto the retry taxonomy.

use crate::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::Response;
use std::time::Duration;

/// Wait used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Classifies a failed send.
///
/// Timeouts and connect failures are transient; anything else is permanent.
pub fn send_error(operation: &str, err: &reqwest::Error) -> Error {
    let error_kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_request() {
        "request"
    } else {
        "unknown"
    };
    tracing::warn!(
        operation = operation,
        error = %err,
        error_kind = error_kind,
        "HTTP request failed"
    );
    let cause = format!("{error_kind} error: {err}");
    if err.is_timeout() || err.is_connect() {
        Error::Transient {
            operation: operation.to_string(),
            cause,
        }
    } else {
        Error::failed(operation, cause)
    }
}

/// Passes successful responses through and classifies the rest.
///
/// 429 becomes [`Error::RateLimited`], 5xx and 408 become [`Error::Transient`],
/// other statuses are permanent failures.
pub fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        tracing::warn!(
            operation = operation,
            retry_after_secs = retry_after.as_secs(),
            "Rate limited"
        );
        return Err(Error::RateLimited {
            operation: operation.to_string(),
            retry_after,
        });
    }

    let body = response.text().unwrap_or_default();
    tracing::error!(
        operation = operation,
        status = %status,
        body = %body,
        "API returned error status"
    );
    let cause = format!("API returned status: {status} - {body}");
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Err(Error::Transient {
            operation: operation.to_string(),
            cause,
        })
    } else {
        Err(Error::failed(operation, cause))
    }
}

/// Reads a `Retry-After` value given in whole seconds.
#[must_use]
pub fn parse_retry_after(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs)
}
