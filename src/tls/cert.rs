//! Peer certificate handling
//!
//! This module turns the peer's X.509 certificate into the normalized view
//! hostname verification works on, and implements fingerprint pinning.

use super::config::TlsError;
use super::san::subject_alt_dns_names;
use super::Result;
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};

/// Normalized view of a peer certificate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificateView {
    /// Subject common name
    pub common_name: Option<String>,
    /// subjectAltName DNS entries, in certificate order
    pub dns_names: Vec<String>,
}

impl PeerCertificateView {
    /// Build the view from a certificate
    ///
    /// With `subject_alt_name_support` off the DNS list is always empty.
    pub fn from_x509(cert: &X509Ref, subject_alt_name_support: bool) -> Self {
        let dns_names = if subject_alt_name_support {
            match cert.to_der() {
                Ok(der) => subject_alt_dns_names(&der),
                Err(e) => {
                    tracing::debug!(error = %e, "peer certificate not encodable");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        PeerCertificateView {
            common_name: Self::get_cn(cert.subject_name()),
            dns_names,
        }
    }

    /// Get Common Name from X509_NAME
    fn get_cn(name: &X509NameRef) -> Option<String> {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
    }

    /// Whether the certificate carried any subjectAltName DNS entry
    pub fn has_subject_alt_name(&self) -> bool {
        !self.dns_names.is_empty()
    }
}

/// Peer certificate in the requested form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCertificate {
    /// DER encoding
    Binary(Vec<u8>),
    /// Decoded common name and DNS names
    Structured(PeerCertificateView),
}

/// Check a certificate against a pinned fingerprint
///
/// The fingerprint is hex (colons and case ignored). Its length selects the
/// digest: 32 digits MD5, 40 SHA-1, 64 SHA-256.
pub fn assert_fingerprint(cert_der: &[u8], fingerprint: &str) -> Result<()> {
    let cleaned: String = fingerprint
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase();

    let digest = match cleaned.len() {
        32 => MessageDigest::md5(),
        40 => MessageDigest::sha1(),
        64 => MessageDigest::sha256(),
        _ => {
            return Err(TlsError::Configuration(format!(
                "fingerprint is of invalid length: {}",
                fingerprint
            )))
        }
    };

    let expected = decode_hex(&cleaned).ok_or_else(|| {
        TlsError::Configuration(format!("fingerprint is not hex: {}", fingerprint))
    })?;

    let actual = hash(digest, cert_der)?;

    if !openssl::memcmp::eq(&actual, &expected) {
        return Err(TlsError::Verification(format!(
            "fingerprints did not match, expected {}, got {}",
            cleaned,
            encode_hex(&actual)
        )));
    }

    Ok(())
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
