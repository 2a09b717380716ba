//! Classification of OCSP fetch failures.
//!
//! Every way a single fetch can go wrong maps onto one [`FetchErrorKind`], and
//! every kind maps onto exactly one [`ErrorAction`]. The mapping is a pure
//! function so the prober and the renewal scheduler agree on what is worth
//! retrying.

use crate::cert::CertificateError;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by the codec and transport collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by a single OCSP fetch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The chain has fewer than two certificates, or the leaf or issuer does
    /// not parse as X.509.
    #[error("invalid certificate provided: {0}")]
    InvalidCertificate(#[source] CertificateError),

    /// The leaf certificate declares no OCSP responder.
    #[error("no OCSP responder defined in leaf certificate")]
    NoResponderDefined,

    /// The codec could not build a request from the leaf and issuer.
    #[error("could not create OCSP request")]
    RequestBuild(#[source] BoxError),

    /// The request could not be delivered, or no response came back.
    #[error("could not post OCSP request to {url}")]
    Transport {
        /// Responder the request was sent to.
        url: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },

    /// A response arrived but its body could not be fully read.
    #[error("could not read OCSP response body")]
    BodyRead(#[source] BoxError),

    /// The body was read but the response resource could not be released.
    #[error("could not close OCSP response body")]
    BodyClose(#[source] BoxError),

    /// The codec rejected the response bytes.
    #[error("response is not a valid OCSP response")]
    ResponseParse(#[source] BoxError),
}

impl FetchError {
    /// Returns the payload-free kind of this error.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::InvalidCertificate(_) => FetchErrorKind::InvalidCertificate,
            FetchError::NoResponderDefined => FetchErrorKind::NoResponderDefined,
            FetchError::RequestBuild(_) => FetchErrorKind::RequestBuildFailure,
            FetchError::Transport { .. } => FetchErrorKind::TransportFailure,
            FetchError::BodyRead(_) => FetchErrorKind::BodyReadFailure,
            FetchError::BodyClose(_) => FetchErrorKind::BodyCloseFailure,
            FetchError::ResponseParse(_) => FetchErrorKind::ResponseParseFailure,
        }
    }

    /// Returns what the caller should do about this error.
    pub fn action(&self) -> ErrorAction {
        self.kind().action()
    }

    /// Returns `true` if the fetch may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        self.action() == ErrorAction::Retry
    }
}

/// Closed set of fetch failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Leaf or issuer unusable, or chain too short.
    InvalidCertificate,
    /// Leaf declares no OCSP responder URL.
    NoResponderDefined,
    /// Codec could not build the request.
    RequestBuildFailure,
    /// Network failure or timeout delivering the request.
    TransportFailure,
    /// Response body could not be read.
    BodyReadFailure,
    /// Response resource could not be released after reading.
    BodyCloseFailure,
    /// Codec rejected the response.
    ResponseParseFailure,
}

impl FetchErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [FetchErrorKind; 7] = [
        FetchErrorKind::InvalidCertificate,
        FetchErrorKind::NoResponderDefined,
        FetchErrorKind::RequestBuildFailure,
        FetchErrorKind::TransportFailure,
        FetchErrorKind::BodyReadFailure,
        FetchErrorKind::BodyCloseFailure,
        FetchErrorKind::ResponseParseFailure,
    ];

    /// Maps the kind to the action the prober and scheduler take.
    ///
    /// Only transport failures are retried. Close failures do not invalidate
    /// bytes already read. Everything else means the configuration is
    /// structurally unusable for OCSP stapling.
    pub const fn action(self) -> ErrorAction {
        match self {
            FetchErrorKind::TransportFailure => ErrorAction::Retry,
            FetchErrorKind::BodyCloseFailure => ErrorAction::Ignore,
            FetchErrorKind::InvalidCertificate
            | FetchErrorKind::NoResponderDefined
            | FetchErrorKind::RequestBuildFailure
            | FetchErrorKind::BodyReadFailure
            | FetchErrorKind::ResponseParseFailure => ErrorAction::Disable,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::InvalidCertificate => "invalid_certificate",
            FetchErrorKind::NoResponderDefined => "no_responder_defined",
            FetchErrorKind::RequestBuildFailure => "request_build_failure",
            FetchErrorKind::TransportFailure => "transport_failure",
            FetchErrorKind::BodyReadFailure => "body_read_failure",
            FetchErrorKind::BodyCloseFailure => "body_close_failure",
            FetchErrorKind::ResponseParseFailure => "response_parse_failure",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do after a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorAction {
    /// Wait and try again.
    Retry,
    /// Stop using OCSP stapling for this certificate.
    Disable,
    /// Log and carry on with the data already obtained.
    Ignore,
}

/// Errors returned when observing an [`OcspStapler`](crate::OcspStapler).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StaplerError {
    /// Every handle to the stapler was dropped; no further updates will arrive.
    #[error("OCSP stapler closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(msg: &str) -> BoxError {
        msg.to_string().into()
    }

    #[test]
    fn test_only_transport_failure_is_retried() {
        let retried: Vec<_> = FetchErrorKind::ALL
            .iter()
            .filter(|k| k.action() == ErrorAction::Retry)
            .collect();
        assert_eq!(retried, [&FetchErrorKind::TransportFailure]);
    }

    #[test]
    fn test_close_failure_is_ignored() {
        assert_eq!(
            FetchErrorKind::BodyCloseFailure.action(),
            ErrorAction::Ignore
        );
    }

    #[test]
    fn test_structural_kinds_disable() {
        for kind in [
            FetchErrorKind::InvalidCertificate,
            FetchErrorKind::NoResponderDefined,
            FetchErrorKind::RequestBuildFailure,
            FetchErrorKind::BodyReadFailure,
            FetchErrorKind::ResponseParseFailure,
        ] {
            assert_eq!(kind.action(), ErrorAction::Disable, "{kind}");
        }
    }

    #[test]
    fn test_error_kind_and_retryable() {
        let transport = FetchError::Transport {
            url: "http://ocsp.example.org".to_string(),
            source: boxed("connection refused"),
        };
        assert_eq!(transport.kind(), FetchErrorKind::TransportFailure);
        assert!(transport.is_retryable());

        let parse = FetchError::ResponseParse(boxed("bad tag"));
        assert_eq!(parse.kind(), FetchErrorKind::ResponseParseFailure);
        assert!(!parse.is_retryable());
        assert_eq!(parse.action(), ErrorAction::Disable);

        assert_eq!(
            FetchError::NoResponderDefined.kind(),
            FetchErrorKind::NoResponderDefined
        );
    }

    #[test]
    fn test_transport_error_keeps_source() {
        use std::error::Error as _;

        let err = FetchError::Transport {
            url: "http://ocsp.example.org".to_string(),
            source: boxed("timed out"),
        };
        assert_eq!(
            err.to_string(),
            "could not post OCSP request to http://ocsp.example.org"
        );
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("timed out"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            FetchErrorKind::TransportFailure.to_string(),
            "transport_failure"
        );
    }
}
