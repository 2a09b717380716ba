//! Optional metrics hook.

use crate::error::FetchErrorKind;

/// Receives stapling events for export to a metrics backend.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// renewal task.
///
/// # Example
///
/// ```
/// use ocsp_stapling::{FetchErrorKind, MetricsRecorder};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct Counters {
///     updates: AtomicU64,
/// }
///
/// impl MetricsRecorder for Counters {
///     fn record_update(&self) {
///         self.updates.fetch_add(1, Ordering::Relaxed);
///     }
///     fn record_retry(&self) {}
///     fn record_error(&self, _kind: FetchErrorKind) {}
/// }
/// ```
pub trait MetricsRecorder: Send + Sync + 'static {
    /// A new staple was installed.
    fn record_update(&self);

    /// A retry was scheduled after a transient failure.
    fn record_retry(&self);

    /// A fetch failed.
    fn record_error(&self, kind: FetchErrorKind);
}
