//! Helpers shared by the capability probe and the renewal loop.

use crate::error::FetchErrorKind;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Consecutive identical failures logged at WARN before demoting to DEBUG.
pub(crate) const MAX_CONSECUTIVE_SAME_ERROR: u32 = 3;

/// Tracks consecutive occurrences of the same failure kind.
///
/// The first [`MAX_CONSECUTIVE_SAME_ERROR`] occurrences of a kind are worth a
/// warning; later repeats are not. A different kind, or a reset after a
/// success, starts the count over.
#[derive(Debug)]
pub(crate) struct ErrorTracker {
    last_kind: Option<FetchErrorKind>,
    consecutive: u32,
    max_consecutive: u32,
}

impl ErrorTracker {
    pub(crate) fn new(max_consecutive: u32) -> Self {
        Self {
            last_kind: None,
            consecutive: 0,
            max_consecutive,
        }
    }

    /// Records a failure and returns whether it should be logged at WARN.
    pub(crate) fn record(&mut self, kind: FetchErrorKind) -> bool {
        let should_warn =
            self.last_kind != Some(kind) || self.consecutive < self.max_consecutive;

        if self.last_kind == Some(kind) {
            self.consecutive += 1;
        } else {
            self.consecutive = 1;
            self.last_kind = Some(kind);
        }

        should_warn
    }

    pub(crate) fn reset(&mut self) {
        self.last_kind = None;
        self.consecutive = 0;
    }

    pub(crate) fn consecutive_count(&self) -> u32 {
        self.consecutive
    }
}

/// Sleeps for `dur` unless `token` fires first.
///
/// Returns `true` if cancelled.
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, dur: Duration) -> bool {
    tokio::select! {
        () = token.cancelled() => true,
        () = sleep(dur) => false,
    }
}

/// Exponential backoff with small jitter.
///
/// Doubles `current`, clamps it to `max`, then adds up to 10% jitter without
/// exceeding `max`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    let cur = current.as_millis().min(u128::from(u64::MAX)) as u64;
    let max = max.as_millis().min(u128::from(u64::MAX)) as u64;

    let base = cur.saturating_mul(2).min(max);
    let jitter = base / 10;
    let add = if jitter > 0 {
        fastrand::u64(0..=jitter)
    } else {
        0
    };

    Duration::from_millis(base.saturating_add(add).min(max))
}
