//! One OCSP request/response cycle against the leaf's responder.

use crate::cert::parsing::{ocsp_responders, parse_der_encoded_bytes_as_x509_certificate};
use crate::cert::CertificateError;
use crate::error::FetchError;
use crate::ocsp::OcspCodec;
use crate::prelude::{debug, warn};
use crate::transport::{Transport, OCSP_REQUEST_CONTENT_TYPE};
use time::OffsetDateTime;

/// A freshly fetched OCSP staple.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchedStaple {
    /// Raw DER-encoded OCSP response, as served to TLS clients.
    pub raw: Vec<u8>,
    /// When the responder will publish newer status.
    pub next_update: OffsetDateTime,
}

impl std::fmt::Debug for FetchedStaple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedStaple")
            .field("raw_len", &self.raw.len())
            .field("next_update", &self.next_update)
            .finish()
    }
}

/// Performs exactly one OCSP exchange for the leaf of `chain`.
///
/// `chain[0]` must be the leaf and `chain[1]` its issuer. The request goes to
/// the first OCSP responder the leaf declares. No retries happen here; see
/// [`FetchError::action`] for how callers should react to failures.
///
/// # Errors
///
/// - [`FetchError::InvalidCertificate`] if the chain has fewer than two entries
///   or the leaf or issuer does not parse. Nothing is sent in that case.
/// - [`FetchError::NoResponderDefined`] if the leaf declares no OCSP responder.
/// - [`FetchError::RequestBuild`] if the codec cannot build the request.
/// - [`FetchError::Transport`] if the request could not be delivered.
/// - [`FetchError::BodyRead`] if the response body could not be read.
/// - [`FetchError::ResponseParse`] if the codec rejects the response.
///
/// A failure to release the response body is logged and otherwise ignored.
pub async fn fetch_staple(
    chain: &[Vec<u8>],
    codec: &dyn OcspCodec,
    transport: &dyn Transport,
) -> Result<FetchedStaple, FetchError> {
    let [leaf_der, issuer_der, ..] = chain else {
        return Err(FetchError::InvalidCertificate(
            CertificateError::ChainTooShort { len: chain.len() },
        ));
    };

    let (url, request) = {
        let leaf = parse_der_encoded_bytes_as_x509_certificate(leaf_der)
            .map_err(FetchError::InvalidCertificate)?;

        let Some(url) = ocsp_responders(&leaf).into_iter().next() else {
            return Err(FetchError::NoResponderDefined);
        };

        let issuer = parse_der_encoded_bytes_as_x509_certificate(issuer_der)
            .map_err(FetchError::InvalidCertificate)?;

        let request = codec
            .build_request(&leaf, &issuer)
            .map_err(FetchError::RequestBuild)?;

        (url, request)
    };

    debug!(
        "Posting OCSP request: url={}, request_len={}",
        url,
        request.len()
    );

    let mut body = transport
        .post(&url, OCSP_REQUEST_CONTENT_TYPE, request)
        .await
        .map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

    let read = body.read_to_end().await.map_err(FetchError::BodyRead);

    if let Err(e) = body.close() {
        let e = FetchError::BodyClose(e);
        warn!(
            "Ignoring OCSP response close failure: url={}, kind={}, error={}",
            url,
            e.kind(),
            e
        );
    }

    let raw = read?;

    let issuer = parse_der_encoded_bytes_as_x509_certificate(issuer_der)
        .map_err(FetchError::InvalidCertificate)?;
    let response = codec
        .parse_response(&raw, &issuer)
        .map_err(FetchError::ResponseParse)?;

    debug!(
        "Fetched OCSP response: url={}, response_len={}, next_update={}",
        url,
        raw.len(),
        response.next_update
    );

    Ok(FetchedStaple {
        raw,
        next_update: response.next_update,
    })
}
