//! rustls integration: serve the stapler's certificate with its OCSP staple.

use crate::cert::CertificateBundle;
use crate::stapler::OcspStapler;
use arc_swap::ArcSwapOption;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::{CertifiedKey, SigningKey};
use std::fmt;
use std::sync::Arc;

/// [`ResolvesServerCert`] that attaches the current OCSP staple.
///
/// The [`CertifiedKey`] is rebuilt only when the stapler installs a new
/// staple; other handshakes reuse the cached one.
///
/// # Examples
///
/// ```no_run
/// # use ocsp_stapling::{OcspStapler, StapledCertResolver};
/// # use rustls::sign::SigningKey;
/// # use std::sync::Arc;
/// # fn example(stapler: OcspStapler, key: Arc<dyn SigningKey>, provider: Arc<rustls::crypto::CryptoProvider>) -> Result<(), rustls::Error> {
/// let resolver = StapledCertResolver::new(stapler, key);
/// let config = rustls::ServerConfig::builder_with_provider(provider)
///     .with_safe_default_protocol_versions()?
///     .with_no_client_auth()
///     .with_cert_resolver(Arc::new(resolver));
/// # Ok(())
/// # }
/// ```
pub struct StapledCertResolver {
    stapler: OcspStapler,
    key: Arc<dyn SigningKey>,
    cached: ArcSwapOption<CachedKey>,
}

struct CachedKey {
    generation: u64,
    certified_key: Arc<CertifiedKey>,
}

impl fmt::Debug for StapledCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StapledCertResolver")
            .field("stapler", &self.stapler)
            .field(
                "cached_generation",
                &self.cached.load_full().map(|cached| cached.generation),
            )
            .finish_non_exhaustive()
    }
}

impl StapledCertResolver {
    /// Creates a resolver serving `stapler`'s chain, signed with `key`.
    pub fn new(stapler: OcspStapler, key: Arc<dyn SigningKey>) -> Self {
        Self {
            stapler,
            key,
            cached: ArcSwapOption::empty(),
        }
    }

    /// Returns the key for the current bundle, rebuilding it if the staple
    /// changed since the last call.
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        let bundle = self.stapler.certificate();

        if let Some(cached) = self.cached.load_full() {
            if cached.generation == bundle.generation() {
                return Arc::clone(&cached.certified_key);
            }
        }

        let certified_key = Arc::new(certified_key_for(&bundle, Arc::clone(&self.key)));
        self.cached.store(Some(Arc::new(CachedKey {
            generation: bundle.generation(),
            certified_key: Arc::clone(&certified_key),
        })));
        certified_key
    }
}

impl ResolvesServerCert for StapledCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.certified_key())
    }
}

fn certified_key_for(bundle: &CertificateBundle, key: Arc<dyn SigningKey>) -> CertifiedKey {
    let chain = bundle
        .chain()
        .iter()
        .map(|der| CertificateDer::from(der.clone()))
        .collect();

    let mut certified_key = CertifiedKey::new(chain, key);
    if bundle.has_staple() {
        certified_key.ocsp = Some(bundle.ocsp_staple().to_vec());
    }
    certified_key
}
