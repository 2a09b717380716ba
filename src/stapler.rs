//! Public entry point: a certificate whose OCSP staple is kept fresh.

use crate::cert::CertificateBundle;
use crate::clock::{duration_until, Clock, SystemClock};
use crate::config::{ProbeConfig, RenewalConfig};
use crate::error::{FetchError, FetchErrorKind, StaplerError};
use crate::fetch::fetch_staple;
use crate::metrics::MetricsRecorder;
use crate::ocsp::OcspCodec;
use crate::prelude::{debug, error, info, warn};
use crate::probe::probe_capability;
use crate::renewal::{RenewalMachine, Step, StopReason};
use crate::store::CertificateStore;
use crate::supervisor_common::{sleep_or_cancel, ErrorTracker, MAX_CONSECUTIVE_SAME_ERROR};
use crate::transport::Transport;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle for receiving staple update notifications from an [`OcspStapler`].
///
/// Each notification carries the generation of the bundle that was just
/// installed. Generations increase by one per installed staple; a slow
/// receiver may skip intermediate values.
///
/// # Examples
///
/// ```no_run
/// # use ocsp_stapling::OcspStapler;
/// # async fn example(stapler: OcspStapler) -> Result<(), Box<dyn std::error::Error>> {
/// let mut updates = stapler.updated();
/// let generation = updates.changed().await?;
/// assert_eq!(stapler.certificate().generation(), generation);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct StaplerUpdates {
    rx: watch::Receiver<u64>,
}

impl StaplerUpdates {
    /// Waits for the next installed staple and returns its generation.
    ///
    /// # Errors
    ///
    /// Returns [`StaplerError::Closed`] once every handle to the stapler has
    /// been dropped.
    pub async fn changed(&mut self) -> Result<u64, StaplerError> {
        self.rx.changed().await.map_err(|_| StaplerError::Closed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Returns the latest generation without waiting.
    pub fn last(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Waits until the generation satisfies `f`.
    ///
    /// Returns immediately if the current generation already does.
    ///
    /// # Errors
    ///
    /// Returns [`StaplerError::Closed`] if the stapler is dropped first.
    pub async fn wait_for<F>(&mut self, mut f: F) -> Result<u64, StaplerError>
    where
        F: FnMut(&u64) -> bool,
    {
        let current = self.last();
        if f(&current) {
            return Ok(current);
        }
        loop {
            let generation = self.changed().await?;
            if f(&generation) {
                return Ok(generation);
            }
        }
    }
}

/// A certificate chain with a self-renewing OCSP staple.
///
/// Construction probes the leaf's OCSP responder once. If stapling turns out
/// to be unusable the stapler still works, it just never attaches a staple
/// ([`is_enabled`](Self::is_enabled) reports which case applies). The
/// staple is kept fresh by [`run_renewal`](Self::run_renewal), which is meant
/// to run as a background task.
///
/// Cloning is cheap; clones share the same certificate and renewal state.
///
/// # Examples
///
/// ```no_run
/// # use ocsp_stapling::{OcspCodec, OcspStapler};
/// # use tokio_util::sync::CancellationToken;
/// # async fn example(chain: Vec<Vec<u8>>, codec: impl OcspCodec) {
/// let cancel = CancellationToken::new();
/// let stapler = OcspStapler::new(&cancel, chain, codec).await;
/// let renewal = stapler.spawn_renewal(cancel.clone());
///
/// // From the TLS handshake path:
/// let bundle = stapler.certificate();
/// let _staple = bundle.ocsp_staple();
///
/// cancel.cancel();
/// let _reason = renewal.await;
/// # }
/// ```
#[derive(Clone)]
pub struct OcspStapler {
    inner: Arc<Inner>,
}

struct Inner {
    store: CertificateStore,
    enabled: AtomicBool,
    running: AtomicBool,
    codec: Arc<dyn OcspCodec>,
    transport: Option<Arc<dyn Transport>>,
    renewal: RenewalConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    update_tx: watch::Sender<u64>,
}

impl fmt::Debug for OcspStapler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcspStapler")
            .field("certificate", &self.inner.store.read())
            .field("enabled", &self.is_enabled())
            .field("running", &self.inner.running.load(Ordering::Relaxed))
            .field("renewal", &self.inner.renewal)
            .field("clock", &self.inner.clock)
            .field(
                "metrics",
                &self.inner.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .finish_non_exhaustive()
    }
}

impl OcspStapler {
    /// Creates a stapler for `chain` using the default HTTP transport.
    ///
    /// `chain` is DER-encoded, leaf first, followed by its issuer. The
    /// capability probe runs before this returns and may take several seconds
    /// if the responder is unreachable; `cancel` cuts it short. Construction
    /// never fails: an unusable chain or responder yields a stapler with
    /// stapling disabled.
    #[cfg(feature = "http")]
    pub async fn new<I, C>(cancel: &CancellationToken, chain: I, codec: impl OcspCodec) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self::builder(chain, codec).build(cancel).await
    }

    /// Returns a builder for a stapler with custom collaborators or policy.
    pub fn builder<I, C>(chain: I, codec: impl OcspCodec) -> OcspStaplerBuilder
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        OcspStaplerBuilder::new(CertificateBundle::new(chain), Arc::new(codec))
    }

    /// Returns the current certificate bundle.
    ///
    /// Never blocks on renewal and never fails. The staple is empty until the
    /// first successful renewal, and stays empty if stapling is disabled.
    pub fn certificate(&self) -> Arc<CertificateBundle> {
        self.inner.store.read()
    }

    /// Returns `true` while OCSP stapling is usable for this certificate.
    ///
    /// Once `false`, it stays `false` for the lifetime of the stapler.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Returns a handle notified whenever a new staple is installed.
    pub fn updated(&self) -> StaplerUpdates {
        StaplerUpdates {
            rx: self.inner.update_tx.subscribe(),
        }
    }

    /// Keeps the staple fresh until cancelled or stopped.
    ///
    /// The first fetch happens after the configured initial delay. After each
    /// success the loop sleeps until the response's `nextUpdate`. Transport
    /// failures are retried with backoff up to the configured limit, after
    /// which the loop stops but the last staple stays in place. Any other
    /// failure disables stapling.
    ///
    /// Returns at once with [`StopReason::Disabled`] if stapling is disabled,
    /// or with [`StopReason::AlreadyRunning`] if another call is in progress
    /// on this stapler or a clone of it.
    pub async fn run_renewal(&self, cancel: &CancellationToken) -> StopReason {
        if !self.is_enabled() {
            debug!("OCSP stapling disabled; renewal not started");
            return StopReason::Disabled;
        }
        let Some(transport) = self.inner.transport.as_deref() else {
            return StopReason::Disabled;
        };

        if self.inner.running.swap(true, Ordering::AcqRel) {
            warn!("OCSP renewal already running; ignoring second start");
            return StopReason::AlreadyRunning;
        }
        let _running = RunningGuard(&self.inner.running);

        info!("Starting OCSP renewal");
        let reason = self.inner.renewal_loop(cancel, transport).await;
        info!("OCSP renewal stopped: reason={}", reason);
        reason
    }

    /// Spawns [`run_renewal`](Self::run_renewal) on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_renewal(&self, cancel: CancellationToken) -> JoinHandle<StopReason> {
        let stapler = self.clone();
        tokio::spawn(async move { stapler.run_renewal(&cancel).await })
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Inner {
    async fn renewal_loop(&self, cancel: &CancellationToken, transport: &dyn Transport) -> StopReason {
        let mut machine = RenewalMachine::new(self.renewal);
        let mut error_tracker = ErrorTracker::new(MAX_CONSECUTIVE_SAME_ERROR);
        let mut step = machine.start();

        loop {
            let wait = match step {
                Step::Sleep(wait) => wait,
                Step::Stop(reason) => return reason,
            };

            if sleep_or_cancel(cancel, wait).await {
                debug!("Cancellation signal received; stopping OCSP renewal");
                step = machine.cancel();
                continue;
            }

            machine.begin_tick();
            let bundle = self.store.read();
            let outcome = fetch_staple(bundle.chain(), self.codec.as_ref(), transport).await;

            if cancel.is_cancelled() {
                debug!("Cancellation signal received during OCSP fetch; discarding result");
                step = machine.cancel();
                continue;
            }

            step = match outcome {
                Ok(staple) => {
                    error_tracker.reset();
                    let generation = self.install_staple(staple.raw);
                    let now = self.clock.now();
                    info!(
                        "Installed OCSP staple: generation={}, next_update={}, wait_secs={}",
                        generation,
                        staple.next_update,
                        duration_until(now, staple.next_update).as_secs()
                    );
                    machine.on_success(staple.next_update, now)
                }
                Err(e) => {
                    let step = machine.on_error(e.action());
                    self.handle_fetch_error(&e, step, &machine, &mut error_tracker);
                    step
                }
            };
        }
    }

    fn handle_fetch_error(
        &self,
        e: &FetchError,
        step: Step,
        machine: &RenewalMachine,
        error_tracker: &mut ErrorTracker,
    ) {
        let kind = e.kind();
        self.record_error(kind);

        match step {
            Step::Sleep(backoff) => {
                self.record_retry();
                if error_tracker.record(kind) {
                    warn!(
                        "OCSP fetch failed; retrying: error={}, backoff_ms={}",
                        e,
                        backoff.as_millis()
                    );
                } else {
                    debug!(
                        "OCSP fetch failed; retrying: error={}, backoff_ms={}, consecutive_errors={}",
                        e,
                        backoff.as_millis(),
                        error_tracker.consecutive_count()
                    );
                }
            }
            Step::Stop(StopReason::RetriesExhausted) => {
                warn!(
                    "OCSP fetch retries exhausted; keeping last staple: consecutive_errors={}, error={}",
                    machine.consecutive_transient_errors(),
                    e
                );
            }
            Step::Stop(StopReason::Disabled) => {
                self.enabled.store(false, Ordering::Release);
                error!("OCSP stapling disabled: kind={}, error={}", kind, e);
            }
            Step::Stop(_) => {}
        }
    }

    fn install_staple(&self, staple: Vec<u8>) -> u64 {
        let generation = self.store.install_staple(staple);
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_update();
        }
        self.update_tx.send_replace(generation);
        generation
    }

    fn record_error(&self, kind: FetchErrorKind) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_error(kind);
        }
    }

    fn record_retry(&self) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_retry();
        }
    }
}

/// Builder for [`OcspStapler`].
///
/// # Example
///
/// ```no_run
/// use ocsp_stapling::{OcspCodec, OcspStapler, ProbeConfig, RenewalConfig};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(chain: Vec<Vec<u8>>, codec: impl OcspCodec) {
/// let cancel = CancellationToken::new();
/// let stapler = OcspStapler::builder(chain, codec)
///     .probe_config(ProbeConfig {
///         max_attempts: 3,
///         ..ProbeConfig::default()
///     })
///     .renewal_config(RenewalConfig {
///         retry_delay: Duration::from_secs(30),
///         max_retry_delay: Duration::from_secs(300),
///         ..RenewalConfig::default()
///     })
///     .build(&cancel)
///     .await;
/// # }
/// ```
pub struct OcspStaplerBuilder {
    bundle: CertificateBundle,
    codec: Arc<dyn OcspCodec>,
    transport: Option<Arc<dyn Transport>>,
    probe: ProbeConfig,
    renewal: RenewalConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl fmt::Debug for OcspStaplerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcspStaplerBuilder")
            .field("bundle", &self.bundle)
            .field("transport", &self.transport.as_ref().map(|_| "<Transport>"))
            .field("probe", &self.probe)
            .field("renewal", &self.renewal)
            .field("clock", &self.clock)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .finish_non_exhaustive()
    }
}

impl OcspStaplerBuilder {
    fn new(bundle: CertificateBundle, codec: Arc<dyn OcspCodec>) -> Self {
        Self {
            bundle,
            codec,
            transport: None,
            probe: ProbeConfig::default(),
            renewal: RenewalConfig::default(),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    /// Sets the transport used to reach the OCSP responder.
    ///
    /// Defaults to [`HttpTransport`](crate::HttpTransport) when the `http`
    /// feature is enabled. Without it, a transport must be supplied or
    /// stapling is disabled.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the capability probe policy.
    #[must_use]
    pub const fn probe_config(mut self, config: ProbeConfig) -> Self {
        self.probe = config;
        self
    }

    /// Sets the renewal policy.
    #[must_use]
    pub const fn renewal_config(mut self, config: RenewalConfig) -> Self {
        self.renewal = config;
        self
    }

    /// Sets the clock used to turn `nextUpdate` into a wait.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets a metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Probes the responder and returns the stapler.
    ///
    /// Never fails; see [`OcspStapler::is_enabled`].
    pub async fn build(self, cancel: &CancellationToken) -> OcspStapler {
        let transport = match self.transport {
            Some(transport) => Some(transport),
            None => default_transport(),
        };

        let enabled = match transport.as_deref() {
            Some(transport) => {
                probe_capability(
                    cancel,
                    self.bundle.chain(),
                    self.codec.as_ref(),
                    transport,
                    self.probe,
                    self.metrics.as_deref(),
                )
                .await
            }
            None => false,
        };

        info!(
            "OCSP stapler created: enabled={}, chain_len={}",
            enabled,
            self.bundle.chain().len()
        );

        let (update_tx, _) = watch::channel(self.bundle.generation());
        OcspStapler {
            inner: Arc::new(Inner {
                store: CertificateStore::new(self.bundle),
                enabled: AtomicBool::new(enabled),
                running: AtomicBool::new(false),
                codec: self.codec,
                transport,
                renewal: self.renewal.normalize(),
                clock: self.clock,
                metrics: self.metrics,
                update_tx,
            }),
        }
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Option<Arc<dyn Transport>> {
    match crate::transport::HttpTransport::new() {
        Ok(transport) => Some(Arc::new(transport)),
        Err(e) => {
            error!(
                "Failed to initialize HTTP transport; OCSP stapling disabled: error={}",
                e
            );
            None
        }
    }
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Option<Arc<dyn Transport>> {
    warn!("No OCSP transport configured; OCSP stapling disabled");
    None
}
