//! One-time check that OCSP stapling works for a certificate chain.

use crate::config::ProbeConfig;
use crate::fetch::fetch_staple;
use crate::metrics::MetricsRecorder;
use crate::ocsp::OcspCodec;
use crate::prelude::{debug, info, warn};
use crate::supervisor_common::{sleep_or_cancel, ErrorTracker, MAX_CONSECUTIVE_SAME_ERROR};
use crate::transport::Transport;
use tokio_util::sync::CancellationToken;

/// Returns `true` if an OCSP staple can be fetched for `chain`.
///
/// Makes up to `config.max_attempts` fetches. Only transport failures are
/// retried, after a wait that grows with each attempt; any other failure
/// means the chain or responder is unusable and ends the probe at once.
/// Cancellation during a wait also ends it, reporting `false`.
///
/// The fetched staple is discarded.
pub async fn probe_capability(
    cancel: &CancellationToken,
    chain: &[Vec<u8>],
    codec: &dyn OcspCodec,
    transport: &dyn Transport,
    config: ProbeConfig,
    metrics: Option<&dyn MetricsRecorder>,
) -> bool {
    if sleep_or_cancel(cancel, config.initial_delay).await {
        debug!("Cancellation signal received; OCSP capability probe aborted");
        return false;
    }

    let mut error_tracker = ErrorTracker::new(MAX_CONSECUTIVE_SAME_ERROR);

    for attempt in 1..=config.max_attempts {
        let err = match fetch_staple(chain, codec, transport).await {
            Ok(staple) => {
                info!(
                    "OCSP stapling available: attempt={}, next_update={}",
                    attempt, staple.next_update
                );
                return true;
            }
            Err(e) => e,
        };

        let kind = err.kind();
        if let Some(m) = metrics {
            m.record_error(kind);
        }

        if !err.is_retryable() {
            warn!("OCSP stapling unavailable: kind={}, error={}", kind, err);
            return false;
        }

        if attempt == config.max_attempts {
            break;
        }

        let delay = config.delay_after(attempt);
        if error_tracker.record(kind) {
            warn!(
                "OCSP probe failed; retrying: attempt={}, error={}, backoff_ms={}",
                attempt,
                err,
                delay.as_millis()
            );
        } else {
            debug!(
                "OCSP probe failed; retrying: attempt={}, error={}, backoff_ms={}, consecutive_errors={}",
                attempt,
                err,
                delay.as_millis(),
                error_tracker.consecutive_count()
            );
        }
        if let Some(m) = metrics {
            m.record_retry();
        }

        if sleep_or_cancel(cancel, delay).await {
            debug!("Cancellation signal received; OCSP capability probe aborted");
            return false;
        }
    }

    warn!(
        "OCSP responder unreachable; stapling disabled: attempts={}",
        config.max_attempts
    );
    false
}
