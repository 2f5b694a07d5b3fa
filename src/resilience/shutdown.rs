//! Cooperative cancellation.

use crate::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Shared stop flag with an interruptible sleep.
///
/// Cloning yields a handle to the same flag. Loops poll
/// [`is_triggered`](Self::is_triggered) between cycles and wait through
/// [`sleep`](Self::sleep), which returns early once the flag is set.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    /// Creates an untriggered handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every sleeper.
    pub fn trigger(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` when the full duration elapsed, `false` when interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        if *guard {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        let (guard, _timeout) = signal
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        !*guard
    }

    /// Returns `Err(Cancelled)` once shutdown has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wires Ctrl-C, plus SIGTERM and SIGHUP on Unix, to this handle.
    ///
    /// Can only be installed once per process.
    pub fn install_signal_handler(&self) -> Result<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Interrupt received, finishing current step");
            handle.trigger();
        })
        .map_err(|e| Error::failed("install_signal_handler", e))
    }
}
