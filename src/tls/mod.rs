//! Pluggable TLS transport
//!
//! This module puts a TLS engine behind a classic blocking-socket API and
//! negotiates the strongest cipher group a server accepts.
//!
//! # Architecture
//!
//! 1. A [`TlsProvider`] creates client sessions; every session step reports
//!    `Ready`, `WouldBlock(direction)` or `Failed` ([`IoStatus`])
//! 2. [`wrap_socket`] drives one handshake and returns a [`WrappedSocket`],
//!    which waits on socket readiness whenever the session would block
//! 3. [`connect_with_downgrade`] retries the handshake over a ranked
//!    [`CipherGroupList`], then checks the peer (fingerprint pin or hostname)
//! 4. [`inject_into`] installs the OpenSSL connector into a [`BackendSlot`]
//!    and [`extract_from`] restores what was there before
//!
//! # Example
//!
//! ```no_run
//! use alttls::tls::{
//!     CipherGroupList, ConnectionParams, Connector, OpenSslProvider, DEFAULT_CIPHER_RANKING,
//! };
//! use std::time::Duration;
//!
//! let provider = OpenSslProvider::new();
//! let ciphers = CipherGroupList::probe(&provider, DEFAULT_CIPHER_RANKING);
//! let connector = Connector::new(provider, ciphers);
//!
//! let params = ConnectionParams::builder("example.com", 443)
//!     .timeout(Duration::from_secs(10))
//!     .build();
//! let mut conn = connector.connect(&params).unwrap();
//! conn.socket.send_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! ```

pub mod cert;
pub mod ciphers;
pub mod config;
pub mod connect;
pub mod handshake;
pub mod hostname;
pub mod inject;
pub mod ossl;
pub mod provider;
pub mod san;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

pub use cert::{assert_fingerprint, PeerCertificate, PeerCertificateView};
pub use ciphers::{CipherGroupList, DEFAULT_CIPHERS, DEFAULT_CIPHER_RANKING};
pub use config::{CertReqs, ContextOptions, ContextOptionsBuilder, TlsError, TlsVersion};
pub use connect::{
    connect_with_downgrade, system_time_is_off, ConnectionParams, ConnectionParamsBuilder,
    Connector, HostnameCheck, SecurityWarning, VerifiedConnection, RECENT_DATE_UNIX,
};
pub use handshake::wrap_socket;
pub use hostname::match_hostname;
pub use inject::{
    extract_from, inject_into, inject_provider_into, select_cipher_groups, BackendSlot,
    InjectOptions, TlsBackend,
};
pub use ossl::{OpenSslProvider, OpenSslSession};
pub use provider::{Direction, IoStatus, RecvFlags, SessionError, TlsProvider, TlsSession};
pub use san::{subject_alt_dns_names, GeneralName, GeneralNames};
pub use socket::{SharedSocket, SocketView, WrappedSocket};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
