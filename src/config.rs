//! Retry and scheduling policy for probing and renewal.

use std::time::Duration;

/// Policy for the one-time capability probe run at construction.
///
/// The probe makes up to `max_attempts` fetches. It waits `initial_delay`
/// before the first one and `retry_step * n` after the `n`th failed attempt,
/// so the gaps grow linearly. Only transport failures are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Maximum number of fetch attempts.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Increment added to the wait after each failed attempt.
    pub retry_step: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1),
            retry_step: Duration::from_secs(1),
        }
    }
}

impl ProbeConfig {
    /// Wait after the `attempt`th (1-based) failed attempt.
    pub(crate) fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_step.saturating_mul(attempt)
    }
}

/// Policy for the background renewal loop.
///
/// If `retry_delay > max_retry_delay`, they are swapped when the stapler is
/// built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalConfig {
    /// Delay before the first renewal tick.
    pub initial_delay: Duration,
    /// Consecutive transient failures tolerated before renewal stops.
    pub max_transient_errors: u32,
    /// Wait after the first transient failure.
    pub retry_delay: Duration,
    /// Upper bound for the wait after repeated transient failures.
    ///
    /// The wait doubles (with a little jitter) after each consecutive failure
    /// until it reaches this bound. With the defaults both values are one
    /// minute, so the wait stays fixed.
    pub max_retry_delay: Duration,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_transient_errors: 10,
            retry_delay: Duration::from_secs(60),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

impl RenewalConfig {
    /// Ensures `retry_delay <= max_retry_delay`.
    pub(crate) fn normalize(mut self) -> Self {
        if self.retry_delay > self.max_retry_delay {
            std::mem::swap(&mut self.retry_delay, &mut self.max_retry_delay);
        }
        self
    }
}
