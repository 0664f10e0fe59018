//! TLS configuration
//!
//! This module provides the TLS context settings shared by every handshake
//! attempt of a connection, and the error type for the whole TLS layer.

use super::provider::SessionError;
use std::path::{Path, PathBuf};

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// SSL 3.0 (deprecated, rarely used)
    Ssl3,
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Parse TLS version from string (case-insensitive)
    ///
    /// Accepts the `PROTOCOL_` prefixed spellings as well (`PROTOCOL_TLSv1_2`).
    pub fn from_str(s: &str) -> Result<Self, TlsError> {
        let upper = s.to_uppercase().replace('_', ".");
        let name = upper.strip_prefix("PROTOCOL.").unwrap_or(&upper);
        match name {
            "SSLV3" | "SSL3" => Ok(TlsVersion::Ssl3),
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Ssl3 => SslVersion::SSL3,
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Ssl3 => "SSLv3",
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// Peer certificate requirement (client-side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertReqs {
    /// Don't verify the server certificate
    None,
    /// Verify the certificate if the server presents one
    Optional,
    /// Require a certificate that verifies against the trust store
    #[default]
    Required,
}

impl CertReqs {
    /// Parse a certificate requirement (`"CERT_REQUIRED"`, `"required"`, ...)
    pub fn from_str(s: &str) -> Result<Self, TlsError> {
        let upper = s.to_uppercase();
        let name = upper.strip_prefix("CERT_").unwrap_or(&upper);
        match name {
            "NONE" => Ok(CertReqs::None),
            "OPTIONAL" => Ok(CertReqs::Optional),
            "REQUIRED" => Ok(CertReqs::Required),
            _ => Err(TlsError::Configuration(format!("unknown cert_reqs: {}", s))),
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported cipher group: {0}")]
    UnsupportedCipherGroup(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Certificate verification failed: {0}")]
    Verification(String),

    #[error("TLS session error: {0}")]
    Session(#[from] SessionError),

    #[error("Tunnel failed: {0}")]
    Tunnel(String),

    #[error("All {attempts} cipher groups failed, last error: {last}")]
    ExhaustedRetries {
        attempts: usize,
        #[source]
        last: Box<TlsError>,
    },
}

impl TlsError {
    /// Whether a failed handshake attempt should fall through to the next
    /// cipher group
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TlsError::Handshake(_) | TlsError::Timeout(_) | TlsError::UnsupportedCipherGroup(_)
        )
    }

    /// The error of the final attempt, for `ExhaustedRetries`
    pub fn last_error(&self) -> &TlsError {
        match self {
            TlsError::ExhaustedRetries { last, .. } => last.last_error(),
            other => other,
        }
    }
}

/// TLS context settings (everything but the cipher group)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    pub(crate) cert_file: Option<PathBuf>,
    pub(crate) key_file: Option<PathBuf>,
    pub(crate) cert_reqs: CertReqs,
    pub(crate) ca_certs: Option<PathBuf>,
    pub(crate) version: Option<TlsVersion>,
}

impl ContextOptions {
    /// Create a new context options builder
    pub fn builder() -> ContextOptionsBuilder {
        ContextOptionsBuilder::default()
    }

    /// Client certificate file, if any
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    /// Private key file; falls back to the certificate file
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref().or(self.cert_file.as_deref())
    }

    /// Peer certificate requirement
    pub fn cert_reqs(&self) -> CertReqs {
        self.cert_reqs
    }

    /// Trust store file; `None` means the platform default paths
    pub fn ca_certs(&self) -> Option<&Path> {
        self.ca_certs.as_deref()
    }

    /// Pinned protocol version; `None` negotiates the highest both sides support
    pub fn version(&self) -> Option<TlsVersion> {
        self.version
    }
}

/// Context options builder
#[derive(Debug, Default)]
pub struct ContextOptionsBuilder {
    options: ContextOptions,
}

impl ContextOptionsBuilder {
    /// Client certificate (PEM)
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cert_file = Some(path.into());
        self
    }

    /// Client private key (PEM)
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.key_file = Some(path.into());
        self
    }

    /// Peer certificate requirement
    pub fn cert_reqs(mut self, reqs: CertReqs) -> Self {
        self.options.cert_reqs = reqs;
        self
    }

    /// Trust store file (PEM)
    pub fn ca_certs(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.ca_certs = Some(path.into());
        self
    }

    /// Pin a protocol version
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.options.version = Some(version);
        self
    }

    /// Build the options
    pub fn build(self) -> ContextOptions {
        self.options
    }
}
