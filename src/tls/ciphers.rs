//! Cipher-suite groups
//!
//! Handshakes are attempted one cipher group at a time, strongest first.
//! The ranking is fixed when the transport is activated: groups the TLS
//! provider does not understand are dropped, and the resulting list is
//! shared read-only by every connection.

use super::provider::TlsProvider;
use std::sync::Arc;

/// Cipher groups ranked from strongest to weakest
pub const DEFAULT_CIPHER_RANKING: &[&str] = &[
    // Forward secrecy with AEAD
    "EECDH+ECDSA+AESGCM",
    "EECDH+aRSA+AESGCM",
    "ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305",
    "EDH+aRSA+AESGCM",
    // Forward secrecy with CBC
    "EECDH+ECDSA+AES",
    "EECDH+aRSA+AES",
    "EDH+aRSA+AES",
    "EDH+aRSA+CAMELLIA",
    "ECDHE-ECDSA-DES-CBC3-SHA:ECDHE-RSA-DES-CBC3-SHA:EDH-RSA-DES-CBC3-SHA",
    // No forward secrecy
    "RSA+AESGCM",
    "RSA+AES",
    "RSA+CAMELLIA",
    "DES-CBC3-SHA",
    // Broken (RC4)
    "ECDHE-ECDSA-RC4-SHA:ECDHE-RSA-RC4-SHA:RC4-SHA:RC4-MD5",
];

/// Cipher string used when a single attempt is made without downgrading
pub const DEFAULT_CIPHERS: &str = "ECDH+AESGCM:DH+AESGCM:ECDH+AES256:DH+AES256:\
ECDH+AES128:DH+AES:ECDH+3DES:DH+3DES:RSA+AESGCM:RSA+AES:RSA+3DES:!aNULL:!MD5:!DSS";

/// Immutable, ranked list of cipher groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherGroupList {
    groups: Arc<[String]>,
}

impl CipherGroupList {
    /// Use `groups` as-is, in the given order
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CipherGroupList {
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// A list holding one cipher string
    pub fn single(group: impl Into<String>) -> Self {
        let group: String = group.into();
        Self::new([group])
    }

    /// Keep the candidates `provider` accepts, preserving their order
    pub fn probe<P: TlsProvider + ?Sized>(provider: &P, candidates: &[&str]) -> Self {
        let groups: Vec<String> = candidates
            .iter()
            .filter(|group| {
                let supported = provider.supports_cipher_group(group);
                if !supported {
                    tracing::debug!(
                        provider = provider.name(),
                        cipher_group = %group,
                        "cipher group not supported"
                    );
                }
                supported
            })
            .map(|group| group.to_string())
            .collect();

        Self::new(groups)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Cipher group at `rank` (0 is the strongest)
    pub fn get(&self, rank: usize) -> Option<&str> {
        self.groups.get(rank).map(String::as_str)
    }
}

impl Default for CipherGroupList {
    fn default() -> Self {
        Self::single(DEFAULT_CIPHERS)
    }
}
