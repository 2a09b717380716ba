#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Keeps a TLS server certificate's OCSP staple fresh in the background.
//!
//! An [`OcspStapler`] owns a certificate chain and the OCSP response currently
//! stapled to it. At construction it probes the leaf's OCSP responder once to
//! find out whether stapling can work at all. If it can,
//! [`OcspStapler::run_renewal`] keeps fetching fresh responses, sleeping until
//! each response's `nextUpdate`, retrying transient network failures and
//! giving up on structural ones. The TLS handshake path reads the current
//! certificate and staple with [`OcspStapler::certificate`], which never
//! blocks on renewal.
//!
//! Encoding and verifying OCSP messages is left to an [`OcspCodec`] provided
//! by the application. Requests travel over a [`Transport`]; with the default
//! `http` feature, [`HttpTransport`] POSTs them with `reqwest`.
//!
//! ```no_run
//! use ocsp_stapling::{OcspCodec, OcspStapler};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(leaf_der: Vec<u8>, issuer_der: Vec<u8>, codec: impl OcspCodec) {
//! let cancel = CancellationToken::new();
//! let stapler = OcspStapler::new(&cancel, [leaf_der, issuer_der], codec).await;
//!
//! if stapler.is_enabled() {
//!     stapler.spawn_renewal(cancel.clone());
//! }
//!
//! // In the certificate callback of the TLS server:
//! let bundle = stapler.certificate();
//! let chain = bundle.chain();
//! let staple = bundle.ocsp_staple(); // empty until the first renewal
//! # let _ = (chain, staple);
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): log through the `log` crate
//! - **`tracing`**: log through `tracing` instead
//! - **`http`** (default): [`HttpTransport`] and [`OcspStapler::new`]
//! - **`rustls`**: [`StapledCertResolver`], a `rustls` certificate resolver
//!   that attaches the staple

mod observability;
mod prelude;

pub mod cert;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod ocsp;
pub mod probe;
pub mod renewal;
pub mod stapler;
pub mod transport;

#[cfg(feature = "rustls")]
pub mod resolver;

mod store;
mod supervisor_common;

#[cfg(test)]
mod testing;

pub use crate::{
    cert::{CertificateBundle, CertificateError},
    clock::{Clock, SystemClock},
    config::{ProbeConfig, RenewalConfig},
    error::{BoxError, ErrorAction, FetchError, FetchErrorKind, StaplerError},
    fetch::{fetch_staple, FetchedStaple},
    metrics::MetricsRecorder,
    ocsp::{OcspCodec, OcspResponse},
    probe::probe_capability,
    renewal::{RenewalState, StopReason},
    stapler::{OcspStapler, OcspStaplerBuilder, StaplerUpdates},
    transport::{ResponseBody, Transport, OCSP_REQUEST_CONTENT_TYPE},
};

#[cfg(feature = "http")]
pub use crate::transport::{HttpTransport, DEFAULT_HTTP_TIMEOUT};

#[cfg(feature = "rustls")]
pub use crate::resolver::StapledCertResolver;
