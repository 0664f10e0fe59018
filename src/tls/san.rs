//! subjectAltName extraction
//!
//! The certificate is parsed with `x509-parser` to locate the subjectAltName
//! extensions; their raw values are then decoded name by name with `der`, so
//! the result does not depend on what the TLS engine chooses to expose.
//!
//! Malformed input never fails the whole certificate. A bad general name
//! ends decoding of the extension it sits in: names decoded before it are
//! kept, later extensions are still read.

use der::asn1::AnyRef;
use der::{Decode, Reader, SliceReader, Tag, Tagged};
use x509_parser::oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Upper bound on general names read from one extension
pub const MAX_GENERAL_NAMES: usize = 1024;

/// GeneralName CHOICE tag of dNSName
const GENERAL_NAME_DNS: u8 = 2;

/// GeneralNames decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed DER: {0}")]
    Der(der::ErrorKind),

    #[error("unexpected tag {0}")]
    UnexpectedTag(Tag),

    #[error("dNSName is not an IA5String")]
    NotIa5,
}

impl From<der::Error> for DecodeError {
    fn from(e: der::Error) -> Self {
        DecodeError::Der(e.kind())
    }
}

/// One decoded GeneralName
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralName {
    DnsName(String),
    /// Any other CHOICE alternative, by context tag number
    Other(u8),
}

impl GeneralName {
    pub fn dns_name(&self) -> Option<&str> {
        match self {
            GeneralName::DnsName(name) => Some(name),
            GeneralName::Other(_) => None,
        }
    }
}

/// Result of decoding a GeneralNames value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneralNames {
    /// Names decoded before the first error, at most `MAX_GENERAL_NAMES`
    pub entries: Vec<GeneralName>,
    /// Why decoding stopped early, if it did
    pub malformed: Option<DecodeError>,
}

impl GeneralNames {
    /// Decode `GeneralNames ::= SEQUENCE SIZE (1..MAX) OF GeneralName`
    pub fn decode(data: &[u8]) -> Self {
        let mut result = GeneralNames::default();

        let mut seq = match names_reader(data) {
            Ok(reader) => reader,
            Err(e) => {
                result.malformed = Some(e);
                return result;
            }
        };

        while !seq.is_finished() {
            if result.entries.len() == MAX_GENERAL_NAMES {
                tracing::debug!(limit = MAX_GENERAL_NAMES, "subjectAltName truncated");
                break;
            }

            let entry = AnyRef::decode(&mut seq).map_err(DecodeError::from);
            match entry.and_then(general_name) {
                Ok(name) => result.entries.push(name),
                Err(e) => {
                    result.malformed = Some(e);
                    break;
                }
            }
        }

        result
    }

    /// The dNSName entries, in encounter order
    pub fn dns_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(GeneralName::dns_name)
    }
}

/// Reader over the contents of the outer SEQUENCE
fn names_reader(data: &[u8]) -> Result<SliceReader<'_>, DecodeError> {
    let outer = AnyRef::from_der(data)?;
    if outer.tag() != Tag::Sequence {
        return Err(DecodeError::UnexpectedTag(outer.tag()));
    }
    Ok(SliceReader::new(outer.value())?)
}

fn general_name(entry: AnyRef<'_>) -> Result<GeneralName, DecodeError> {
    let (constructed, number) = match entry.tag() {
        Tag::ContextSpecific {
            constructed,
            number,
        } => (constructed, number.value()),
        other => return Err(DecodeError::UnexpectedTag(other)),
    };

    if number != GENERAL_NAME_DNS {
        return Ok(GeneralName::Other(number));
    }

    let value = entry.value();
    if constructed || !value.is_ascii() {
        return Err(DecodeError::NotIa5);
    }

    // is_ascii() guarantees valid UTF-8
    let name = std::str::from_utf8(value).map_err(|_| DecodeError::NotIa5)?;
    Ok(GeneralName::DnsName(name.to_string()))
}

/// DNS names of every subjectAltName extension in a DER certificate
///
/// Returns an empty list when the certificate has no such extension or
/// cannot be parsed.
pub fn subject_alt_dns_names(cert_der: &[u8]) -> Vec<String> {
    let mut names = Vec::new();

    let cert = match X509Certificate::from_der(cert_der) {
        Ok((_, cert)) => cert,
        Err(e) => {
            tracing::debug!(error = %e, "certificate not decodable");
            return names;
        }
    };

    for extension in cert.tbs_certificate.extensions() {
        if extension.oid != OID_X509_EXT_SUBJECT_ALT_NAME {
            continue;
        }

        let decoded = GeneralNames::decode(extension.value);
        if let Some(ref e) = decoded.malformed {
            tracing::debug!(
                error = %e,
                kept = decoded.entries.len(),
                "malformed subjectAltName entry"
            );
        }
        names.extend(decoded.dns_names().map(str::to_string));
    }

    names
}
