//! # Daybook
//!
//! Incremental maintenance for a personal knowledge base.
//!
//! Daybook keeps a folder of daily markdown notes, a saved-message archive, and a
//! lifelog export up to date without ever duplicating what is already recorded.
//! Every flow follows the same shape: read a watermark, fetch only the delta,
//! merge it into the artifact idempotently, then advance the watermark.
//!
//! ## Features
//!
//! - Daily note carryover (template, cross-reference, open tasks, rolling summaries)
//! - Saved-message archive sync with paginated delta fetch and adaptive monitor mode
//! - Lifelog date-window sync with a persisted `.last_sync` watermark
//! - Pattern classification of archived messages via a local Ollama model
//!
//! ## Example
//!
//! ```rust,ignore
//! use daybook::document::{Document, Placement};
//!
//! let mut doc = Document::parse(&std::fs::read_to_string("2025-03-02.md")?);
//! doc.ensure_section("Due in the next two weeks - Anticipation", Placement::End);
//! doc.canonicalize("Due in the next two weeks - Anticipation");
//! daybook::document::save_atomic("2025-03-02.md", &doc.render())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;

// Module declarations
pub mod classify;
pub mod config;
pub mod document;
pub mod git;
pub mod instance;
pub mod journal;
pub mod lifelog;
pub mod llm;
pub mod messages;
pub mod observability;
pub mod resilience;
pub mod watermark;

// Re-exports for convenience
pub use config::{DaybookConfig, JournalFeatures};
pub use document::{Document, Placement, Section};
pub use instance::SingleInstanceGuard;
pub use llm::LlmProvider;
pub use resilience::{PollSchedule, RetryPolicy, Shutdown};
pub use watermark::{CounterFile, DirectoryScan, WatermarkSource};

/// Error type for daybook operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed flags, bad dates, unusable configuration values |
/// | `OperationFailed` | I/O errors, git operations fail, unexpected API responses |
/// | `Precondition` | Required file, directory, credential or service is missing |
/// | `Transient` | Network timeouts, connection failures, 5xx responses |
/// | `RateLimited` | The remote side asked us to back off for a while |
/// | `InstanceLocked` | Another process holds the single-instance lock |
/// | `Cancelled` | Ctrl-C was received while an operation was in flight |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur
    /// - A response body cannot be decoded
    /// - A git commit cannot be created
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A precondition for running was not met.
    ///
    /// Raised before any artifact is touched, e.g. the journal directory or
    /// template is missing, or no API key is configured.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A retryable failure talking to a remote service.
    #[error("transient failure in '{operation}': {cause}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The remote side signalled a rate limit.
    #[error("rate limited in '{operation}', retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// The operation that was rate limited.
        operation: String,
        /// How long the server asked us to wait.
        retry_after: Duration,
    },

    /// Another instance already holds the lock.
    #[error("another instance is already running (lock held on {})", path.display())]
    InstanceLocked {
        /// The lock file path.
        path: PathBuf,
    },

    /// The operation was interrupted by a shutdown request.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Process exit code for a run that ended with this error.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 1 | Any other failure |
    /// | 2 | Precondition failure |
    /// | 3 | Lock held by another instance |
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Precondition(_) => 2,
            Self::InstanceLocked { .. } => 3,
            _ => 1,
        }
    }

    /// Returns true for failures worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Server-requested wait for rate-limit errors.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Builds an `OperationFailed` from any displayable cause.
    pub fn failed(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for daybook operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::RateLimited {
            operation: "fetch_page".to_string(),
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "rate limited in 'fetch_page', retry after 30s"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let precondition = Error::Precondition("no template".to_string());
        let locked = Error::InstanceLocked {
            path: PathBuf::from("/tmp/x.lock"),
        };
        let other = Error::failed("write", "disk full");

        assert_eq!(precondition.exit_code(), 2);
        assert_eq!(locked.exit_code(), 3);
        assert_eq!(other.exit_code(), 1);
    }

    #[test]
    fn test_transient_classification() {
        let transient = Error::Transient {
            operation: "ollama_request".to_string(),
            cause: "timeout".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!Error::Cancelled.is_transient());

        let limited = Error::RateLimited {
            operation: "fetch_page".to_string(),
            retry_after: Duration::from_secs(7),
        };
        assert!(!limited.is_transient());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
    }
}
