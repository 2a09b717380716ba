//! State machine driving the background renewal loop.
//!
//! [`RenewalMachine`] owns no timers and performs no I/O. The loop in
//! [`OcspStapler::run_renewal`](crate::OcspStapler::run_renewal) asks it what
//! to do next after every fetch and sleeps accordingly, so every transition
//! can be exercised without waiting on real time.

use crate::clock::duration_until;
use crate::config::RenewalConfig;
use crate::error::ErrorAction;
use crate::supervisor_common::next_backoff;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// Why the renewal loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StopReason {
    /// Stapling is not usable for this certificate.
    ///
    /// Either the capability probe failed or renewal hit a structural error.
    Disabled,
    /// Too many consecutive transient failures. The last staple is retained.
    RetriesExhausted,
    /// The cancellation token fired.
    Cancelled,
    /// Another renewal loop is already running for the same stapler.
    AlreadyRunning,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Cancelled => "cancelled",
            Self::AlreadyRunning => "already_running",
        })
    }
}

/// Where the renewal loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalState {
    /// Waiting for the first tick, or for the next one after a success.
    Idle,
    /// A fetch is in flight.
    Running,
    /// Waiting to retry after a transient failure.
    Backoff,
    /// Terminal.
    Stopped(StopReason),
}

/// What the loop should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Sleep this long, then tick.
    Sleep(Duration),
    /// Exit with this reason.
    Stop(StopReason),
}

/// Renewal schedule and retry bookkeeping.
///
/// ```
/// use ocsp_stapling::renewal::{RenewalMachine, RenewalState, Step};
/// use ocsp_stapling::RenewalConfig;
/// use std::time::Duration;
/// use time::OffsetDateTime;
///
/// let mut machine = RenewalMachine::new(RenewalConfig::default());
/// assert_eq!(machine.start(), Step::Sleep(Duration::from_secs(1)));
///
/// machine.begin_tick();
/// let now = OffsetDateTime::UNIX_EPOCH;
/// let step = machine.on_success(now + time::Duration::hours(1), now);
/// assert_eq!(step, Step::Sleep(Duration::from_secs(3600)));
/// assert_eq!(machine.state(), RenewalState::Idle);
/// ```
#[derive(Clone, Debug)]
pub struct RenewalMachine {
    config: RenewalConfig,
    state: RenewalState,
    consecutive_transient_errors: u32,
    backoff: Option<Duration>,
    next_wait: Duration,
}

impl RenewalMachine {
    /// Creates a machine in [`RenewalState::Idle`].
    ///
    /// Inverted retry delays in `config` are swapped.
    pub fn new(config: RenewalConfig) -> Self {
        let config = config.normalize();
        Self {
            config,
            state: RenewalState::Idle,
            consecutive_transient_errors: 0,
            backoff: None,
            next_wait: config.initial_delay,
        }
    }

    /// Current state.
    pub fn state(&self) -> RenewalState {
        self.state
    }

    /// Transient failures since the last success.
    pub fn consecutive_transient_errors(&self) -> u32 {
        self.consecutive_transient_errors
    }

    /// Wait chosen by the most recent transition.
    pub fn next_wait(&self) -> Duration {
        self.next_wait
    }

    /// Returns the first step: the initial delay before the first tick.
    pub fn start(&self) -> Step {
        self.current_step()
    }

    /// Marks a tick as fired. Has no effect once stopped.
    pub fn begin_tick(&mut self) {
        if !self.is_stopped() {
            self.state = RenewalState::Running;
        }
    }

    /// Records a successful fetch whose response is valid until `next_update`.
    ///
    /// The next tick is scheduled for `next_update`. A deadline already in the
    /// past schedules it immediately.
    pub fn on_success(&mut self, next_update: OffsetDateTime, now: OffsetDateTime) -> Step {
        if self.is_stopped() {
            return self.current_step();
        }

        self.consecutive_transient_errors = 0;
        self.backoff = None;
        self.next_wait = duration_until(now, next_update);
        self.state = RenewalState::Idle;
        self.current_step()
    }

    /// Records a failed fetch classified as `action`.
    pub fn on_error(&mut self, action: ErrorAction) -> Step {
        if self.is_stopped() {
            return self.current_step();
        }

        match action {
            ErrorAction::Retry => {
                self.consecutive_transient_errors =
                    self.consecutive_transient_errors.saturating_add(1);
                if self.consecutive_transient_errors > self.config.max_transient_errors {
                    self.state = RenewalState::Stopped(StopReason::RetriesExhausted);
                    return self.current_step();
                }

                let wait = match self.backoff {
                    None => self.config.retry_delay,
                    Some(previous) => next_backoff(previous, self.config.max_retry_delay),
                };
                self.backoff = Some(wait);
                self.next_wait = wait;
                self.state = RenewalState::Backoff;
            }
            ErrorAction::Disable => {
                self.state = RenewalState::Stopped(StopReason::Disabled);
            }
            // Nothing was lost; try again on the current schedule.
            ErrorAction::Ignore => {
                self.state = RenewalState::Backoff;
            }
        }
        self.current_step()
    }

    /// Stops the machine because the cancellation token fired.
    pub fn cancel(&mut self) -> Step {
        if !self.is_stopped() {
            self.state = RenewalState::Stopped(StopReason::Cancelled);
        }
        self.current_step()
    }

    fn is_stopped(&self) -> bool {
        matches!(self.state, RenewalState::Stopped(_))
    }

    fn current_step(&self) -> Step {
        match self.state {
            RenewalState::Stopped(reason) => Step::Stop(reason),
            _ => Step::Sleep(self.next_wait),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    fn config() -> RenewalConfig {
        RenewalConfig {
            initial_delay: Duration::from_secs(1),
            max_transient_errors: 3,
            retry_delay: Duration::from_secs(60),
            max_retry_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_starts_idle_with_initial_delay() {
        let machine = RenewalMachine::new(config());
        assert_eq!(machine.state(), RenewalState::Idle);
        assert_eq!(machine.start(), Step::Sleep(Duration::from_secs(1)));
    }

    #[test]
    fn test_success_sleeps_until_next_update() {
        let mut machine = RenewalMachine::new(config());
        machine.begin_tick();
        assert_eq!(machine.state(), RenewalState::Running);

        let step = machine.on_success(epoch() + time::Duration::seconds(3600), epoch());
        assert_eq!(step, Step::Sleep(Duration::from_secs(3600)));
        assert_eq!(machine.state(), RenewalState::Idle);

        machine.begin_tick();
        let now = epoch() + time::Duration::seconds(3600);
        let step = machine.on_success(now + time::Duration::seconds(7200), now);
        assert_eq!(step, Step::Sleep(Duration::from_secs(7200)));
    }

    #[test]
    fn test_stale_next_update_ticks_immediately() {
        let mut machine = RenewalMachine::new(config());
        machine.begin_tick();
        let now = epoch() + time::Duration::days(1);
        assert_eq!(machine.on_success(epoch(), now), Step::Sleep(Duration::ZERO));
    }

    #[test]
    fn test_transient_errors_back_off_then_exhaust() {
        let mut machine = RenewalMachine::new(config());

        for n in 1..=3 {
            machine.begin_tick();
            let step = machine.on_error(ErrorAction::Retry);
            assert_eq!(step, Step::Sleep(Duration::from_secs(60)));
            assert_eq!(machine.state(), RenewalState::Backoff);
            assert_eq!(machine.consecutive_transient_errors(), n);
        }

        machine.begin_tick();
        assert_eq!(
            machine.on_error(ErrorAction::Retry),
            Step::Stop(StopReason::RetriesExhausted)
        );
        assert_eq!(
            machine.state(),
            RenewalState::Stopped(StopReason::RetriesExhausted)
        );
    }

    #[test]
    fn test_success_resets_transient_counter() {
        let mut machine = RenewalMachine::new(config());
        for _ in 0..3 {
            machine.begin_tick();
            machine.on_error(ErrorAction::Retry);
        }

        machine.begin_tick();
        machine.on_success(epoch() + time::Duration::seconds(10), epoch());
        assert_eq!(machine.consecutive_transient_errors(), 0);

        machine.begin_tick();
        assert_eq!(
            machine.on_error(ErrorAction::Retry),
            Step::Sleep(Duration::from_secs(60))
        );
        assert_eq!(machine.consecutive_transient_errors(), 1);
    }

    #[test]
    fn test_backoff_escalates_up_to_max() {
        let mut machine = RenewalMachine::new(RenewalConfig {
            max_transient_errors: 10,
            retry_delay: Duration::from_secs(10),
            max_retry_delay: Duration::from_secs(60),
            ..config()
        });

        let mut waits = Vec::new();
        for _ in 0..6 {
            machine.begin_tick();
            match machine.on_error(ErrorAction::Retry) {
                Step::Sleep(wait) => waits.push(wait),
                Step::Stop(reason) => panic!("unexpected stop: {reason}"),
            }
        }

        assert_eq!(waits[0], Duration::from_secs(10));
        assert!(waits.windows(2).all(|w| w[0] <= w[1]));
        assert!(waits[1] >= Duration::from_secs(20));
        assert_eq!(waits[5], Duration::from_secs(60));
    }

    #[test]
    fn test_structural_error_disables() {
        let mut machine = RenewalMachine::new(config());
        machine.begin_tick();
        assert_eq!(
            machine.on_error(ErrorAction::Disable),
            Step::Stop(StopReason::Disabled)
        );
    }

    #[test]
    fn test_ignored_error_keeps_schedule() {
        let mut machine = RenewalMachine::new(config());
        machine.begin_tick();
        assert_eq!(
            machine.on_error(ErrorAction::Ignore),
            Step::Sleep(Duration::from_secs(1))
        );
        assert_eq!(machine.consecutive_transient_errors(), 0);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let mut machine = RenewalMachine::new(config());
        assert_eq!(machine.cancel(), Step::Stop(StopReason::Cancelled));

        machine.begin_tick();
        assert_eq!(
            machine.state(),
            RenewalState::Stopped(StopReason::Cancelled)
        );
        assert_eq!(
            machine.on_success(epoch() + time::Duration::seconds(10), epoch()),
            Step::Stop(StopReason::Cancelled)
        );
        assert_eq!(
            machine.on_error(ErrorAction::Disable),
            Step::Stop(StopReason::Cancelled)
        );
    }
}
