//! Internal X.509 decoding helpers.

use crate::cert::error::CertificateError;
use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::nom::Err;

/// DER content octets of `id-ad-ocsp` (1.3.6.1.5.5.7.48.1).
const OCSP_ACCESS_METHOD: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01];

/// Upper bound on responder URLs collected from one certificate.
const MAX_RESPONDERS: usize = 8;

/// Parses the given DER-encoded bytes as exactly one X.509 certificate.
///
/// Trailing bytes after the certificate are rejected.
pub(crate) fn parse_der_encoded_bytes_as_x509_certificate(
    der_bytes: &[u8],
) -> Result<X509Certificate<'_>, CertificateError> {
    match x509_parser::parse_x509_certificate(der_bytes) {
        Ok((rest, _)) if !rest.is_empty() => Err(CertificateError::TrailingData(rest.len())),
        Ok((_, cert)) => Ok(cert),
        Err(Err::Incomplete(_)) => Err(CertificateError::ParseX509Certificate(
            X509Error::InvalidCertificate,
        )),
        Err(Err::Error(e) | Err::Failure(e)) => Err(CertificateError::ParseX509Certificate(e)),
    }
}

/// Returns the OCSP responder URLs declared in the certificate's Authority
/// Information Access extension, in declaration order.
pub(crate) fn ocsp_responders(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();

    for ext in cert.extensions() {
        let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() else {
            continue;
        };

        for desc in &aia.accessdescs {
            if desc.access_method.as_bytes() != OCSP_ACCESS_METHOD {
                continue;
            }
            if let GeneralName::URI(uri) = &desc.access_location {
                if urls.len() == MAX_RESPONDERS {
                    return urls;
                }
                urls.push((*uri).to_string());
            }
        }
    }

    urls
}
