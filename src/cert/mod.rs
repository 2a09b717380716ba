//! Certificate material served to TLS handshakes.
//!
//! A [`CertificateBundle`] pairs a DER certificate chain with the OCSP staple
//! currently attached to it. Bundles are immutable values: installing a new
//! staple produces the next generation of the bundle rather than editing the
//! existing one, so a reader holding a bundle always sees a chain and a staple
//! that belong together.

use std::fmt;
use std::sync::Arc;

mod error;
pub(crate) mod parsing;

pub use error::CertificateError;

/// A certificate chain together with its current OCSP staple.
///
/// Index 0 of the chain is the leaf (the server's own certificate), index 1
/// its issuer. Further entries are served to clients but ignored for OCSP.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    chain: Arc<[Vec<u8>]>,
    ocsp_staple: Vec<u8>,
    generation: u64,
}

impl CertificateBundle {
    /// Creates a bundle from DER-encoded certificates, leaf first.
    ///
    /// The certificates are not parsed here; a chain that cannot be used for
    /// OCSP is detected by the capability probe, which then disables stapling.
    ///
    /// # Examples
    ///
    /// ```
    /// use ocsp_stapling::CertificateBundle;
    ///
    /// let bundle = CertificateBundle::new([vec![0x30, 0x00], vec![0x30, 0x00]]);
    /// assert_eq!(bundle.chain().len(), 2);
    /// assert!(!bundle.has_staple());
    /// assert_eq!(bundle.generation(), 0);
    /// ```
    pub fn new<I, C>(chain: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chain: chain.into_iter().map(Into::<Vec<u8>>::into).collect(),
            ocsp_staple: Vec::new(),
            generation: 0,
        }
    }

    /// Returns the DER-encoded chain, leaf first.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Returns the leaf certificate, if the chain is not empty.
    pub fn leaf(&self) -> Option<&[u8]> {
        self.chain.first().map(Vec::as_slice)
    }

    /// Returns the issuer of the leaf, if present.
    pub fn issuer(&self) -> Option<&[u8]> {
        self.chain.get(1).map(Vec::as_slice)
    }

    /// Returns the raw OCSP response currently stapled, empty if none.
    pub fn ocsp_staple(&self) -> &[u8] {
        &self.ocsp_staple
    }

    /// Returns `true` once a staple has been installed.
    pub fn has_staple(&self) -> bool {
        !self.ocsp_staple.is_empty()
    }

    /// Number of staples installed since construction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the next generation of this bundle carrying `staple`.
    ///
    /// The chain is shared with `self`, not copied.
    pub(crate) fn with_staple(&self, staple: Vec<u8>) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            ocsp_staple: staple,
            generation: self.generation + 1,
        }
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("chain_len", &self.chain.len())
            .field("ocsp_staple_len", &self.ocsp_staple.len())
            .field("generation", &self.generation)
            .finish()
    }
}
