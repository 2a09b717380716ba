//! Wall-clock source used to turn a response's `nextUpdate` into a wait.

use std::fmt::Debug;
use std::time::Duration;
use time::OffsetDateTime;

/// Source of the current UTC time.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] reading the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Returns how long to wait from `now` until `deadline`.
///
/// Deadlines in the past yield a zero wait.
pub(crate) fn duration_until(now: OffsetDateTime, deadline: OffsetDateTime) -> Duration {
    Duration::try_from(deadline - now).unwrap_or(Duration::ZERO)
}
