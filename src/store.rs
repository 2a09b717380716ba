//! Shared holder of the current certificate bundle.

use crate::cert::CertificateBundle;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Lock-free store for the current [`CertificateBundle`].
///
/// Readers get a consistent snapshot without blocking. A staple replacement
/// builds a whole new bundle and swaps it in, so a reader never sees a chain
/// from one generation paired with a staple from another.
#[derive(Debug)]
pub(crate) struct CertificateStore {
    current: ArcSwap<CertificateBundle>,
}

impl CertificateStore {
    pub(crate) fn new(bundle: CertificateBundle) -> Self {
        Self {
            current: ArcSwap::from_pointee(bundle),
        }
    }

    /// Returns the current bundle.
    pub(crate) fn read(&self) -> Arc<CertificateBundle> {
        self.current.load_full()
    }

    /// Installs `staple` into the next generation and returns that generation.
    pub(crate) fn install_staple(&self, staple: Vec<u8>) -> u64 {
        let previous = self
            .current
            .rcu(|current| Arc::new(current.with_staple(staple.clone())));
        previous.generation() + 1
    }
}
