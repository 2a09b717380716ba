//! The OCSP wire codec seam.
//!
//! Encoding requests and decoding (and verifying) responses is delegated to
//! an [`OcspCodec`] supplied by the embedding application, typically a thin
//! wrapper around whichever OCSP library it already trusts.

use crate::error::BoxError;
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;

/// Encodes OCSP requests and decodes OCSP responses.
///
/// # Example
///
/// ```no_run
/// use ocsp_stapling::{BoxError, OcspCodec, OcspResponse};
/// use x509_parser::certificate::X509Certificate;
///
/// #[derive(Debug)]
/// struct MyCodec;
///
/// impl OcspCodec for MyCodec {
///     fn build_request(
///         &self,
///         leaf: &X509Certificate<'_>,
///         issuer: &X509Certificate<'_>,
///     ) -> Result<Vec<u8>, BoxError> {
///         # let _ = (leaf, issuer);
///         // DER-encode an OCSPRequest for `leaf`, identified through `issuer`.
///         unimplemented!()
///     }
///
///     fn parse_response(
///         &self,
///         response: &[u8],
///         issuer: &X509Certificate<'_>,
///     ) -> Result<OcspResponse, BoxError> {
///         # let _ = (response, issuer);
///         // Decode, verify against `issuer`, and report the validity window.
///         unimplemented!()
///     }
/// }
/// ```
pub trait OcspCodec: Send + Sync + 'static {
    /// Builds the DER-encoded OCSP request for `leaf`, issued by `issuer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be constructed from the given
    /// certificates.
    fn build_request(
        &self,
        leaf: &X509Certificate<'_>,
        issuer: &X509Certificate<'_>,
    ) -> Result<Vec<u8>, BoxError>;

    /// Parses a DER-encoded OCSP response, verifying it with `issuer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid OCSP response for the
    /// certificate issued by `issuer`.
    fn parse_response(
        &self,
        response: &[u8],
        issuer: &X509Certificate<'_>,
    ) -> Result<OcspResponse, BoxError>;
}

/// The parts of a decoded OCSP response that drive renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcspResponse {
    /// When the responder produced this status.
    pub this_update: Option<OffsetDateTime>,
    /// When the responder will publish newer status; the staple should be
    /// replaced at that time.
    pub next_update: OffsetDateTime,
}

impl OcspResponse {
    /// Creates a response valid until `next_update`.
    pub fn new(next_update: OffsetDateTime) -> Self {
        Self {
            this_update: None,
            next_update,
        }
    }

    /// Sets the time the responder produced this status.
    #[must_use]
    pub fn with_this_update(mut self, this_update: OffsetDateTime) -> Self {
        self.this_update = Some(this_update);
        self
    }
}
