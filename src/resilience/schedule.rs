//! Adaptive polling interval for monitor mode.

use std::time::Duration;

/// Polling cadence that stretches while nothing happens and relaxes back once
/// new items show up.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    baseline: Duration,
    ceiling: Duration,
    current: Duration,
}

impl PollSchedule {
    /// Lowest interval monitor mode will ever use.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(300);

    /// Highest interval backoff may reach.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(1800);

    /// Growth factor after an empty poll; also the decay divisor.
    pub const BACKOFF_FACTOR: f64 = 1.5;

    /// Growth factor after a rate limit or failed poll.
    pub const PENALTY_FACTOR: f64 = 2.0;

    /// Creates a schedule from the configured interval, clamped to the standard bounds.
    #[must_use]
    pub fn new(configured: Duration) -> Self {
        Self::with_bounds(configured, Self::MIN_INTERVAL, Self::MAX_INTERVAL)
    }

    /// Creates a schedule with explicit bounds.
    ///
    /// The baseline is `max(configured, floor)`; the ceiling is raised to the
    /// baseline if needed.
    #[must_use]
    pub fn with_bounds(configured: Duration, floor: Duration, ceiling: Duration) -> Self {
        let baseline = configured.max(floor);
        Self {
            baseline,
            ceiling: ceiling.max(baseline),
            current: baseline,
        }
    }

    /// Interval to sleep before the next poll.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Interval the schedule decays back to.
    #[must_use]
    pub const fn baseline(&self) -> Duration {
        self.baseline
    }

    /// Upper bound of the interval.
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// A poll returned nothing new.
    pub fn on_empty(&mut self) {
        self.current = self.current.mul_f64(Self::BACKOFF_FACTOR).min(self.ceiling);
    }

    /// A poll returned new items.
    pub fn on_items(&mut self) {
        self.current = self.current.div_f64(Self::BACKOFF_FACTOR).max(self.baseline);
    }

    /// The source asked us to slow down.
    pub fn on_rate_limited(&mut self) {
        self.current = self.current.mul_f64(Self::PENALTY_FACTOR).min(self.ceiling);
    }

    /// The poll failed for another reason.
    pub fn on_failure(&mut self) {
        self.on_rate_limited();
    }
}
