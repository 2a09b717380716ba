//! Error types for certificate chain handling.

use x509_parser::error::X509Error;

/// An error that may arise reading the certificate material used for OCSP.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// The chain lacks the issuer certificate needed to build an OCSP request.
    #[error("certificate chain must contain the leaf and its issuer (got {len} certificate(s))")]
    ChainTooShort {
        /// Number of certificates in the chain.
        len: usize,
    },

    /// Error returned by the X.509 parsing library.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// The DER certificate is followed by unexpected bytes.
    #[error("X.509 certificate has {0} trailing byte(s)")]
    TrailingData(usize),
}
