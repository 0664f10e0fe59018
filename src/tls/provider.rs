//! TLS provider contract
//!
//! The engine that actually speaks TLS is opaque to the rest of the crate.
//! It is reached through two traits: [`TlsProvider`] builds client sessions
//! over a raw socket, and [`TlsSession`] drives one session. Every step that
//! can stall reports it as an explicit [`IoStatus::WouldBlock`] instead of an
//! error, so the blocking adapter and the handshake loop are plain state
//! machines over this result.

use super::config::ContextOptions;
use super::Result;
use crate::net::RawSocket;
use crate::session::PollEvents;
use openssl::x509::X509;
use std::io;

/// Which readiness a stalled operation is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Poll events that satisfy this direction
    pub fn poll_events(self) -> PollEvents {
        match self {
            Direction::Read => PollEvents::Read,
            Direction::Write => PollEvents::Write,
        }
    }
}

/// Outcome of one non-blocking session step
#[derive(Debug)]
pub enum IoStatus<T> {
    /// The step completed
    Ready(T),
    /// The step needs the socket to become ready in `Direction` first
    WouldBlock(Direction),
    /// The step failed
    Failed(SessionError),
}

/// Session-level failures reported by a provider
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer went away without a close_notify alert
    #[error("Unexpected EOF")]
    RaggedEof,

    /// The peer sent close_notify
    #[error("TLS connection closed by peer")]
    ZeroReturn,

    #[error("TLS protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Receive flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecvFlags {
    /// Return data without consuming it
    pub peek: bool,
}

impl RecvFlags {
    pub const NONE: RecvFlags = RecvFlags { peek: false };
    pub const PEEK: RecvFlags = RecvFlags { peek: true };
}

/// One client-side TLS session bound to a raw socket
pub trait TlsSession {
    /// Advance the client handshake by one step
    fn handshake(&mut self) -> IoStatus<()>;

    /// Read decrypted application data
    fn recv(&mut self, buf: &mut [u8], flags: RecvFlags) -> IoStatus<usize>;

    /// Encrypt and send application data, returning how many bytes were accepted
    fn send(&mut self, data: &[u8]) -> IoStatus<usize>;

    /// Send close_notify
    fn shutdown(&mut self) -> IoStatus<()>;

    /// Whether the peer's close_notify has been received
    fn received_shutdown(&mut self) -> bool;

    /// Decrypted bytes buffered by the engine, readable without touching the socket
    fn pending(&self) -> usize;

    /// The peer's leaf certificate, if it presented one
    fn peer_certificate(&self) -> Option<X509>;

    /// Name of the negotiated cipher
    fn cipher_name(&self) -> Option<String>;

    /// Forward secrecy details of the negotiated key exchange
    fn pfs_details(&self) -> Option<String> {
        None
    }
}

impl<T: TlsSession + ?Sized> TlsSession for Box<T> {
    fn handshake(&mut self) -> IoStatus<()> {
        (**self).handshake()
    }

    fn recv(&mut self, buf: &mut [u8], flags: RecvFlags) -> IoStatus<usize> {
        (**self).recv(buf, flags)
    }

    fn send(&mut self, data: &[u8]) -> IoStatus<usize> {
        (**self).send(data)
    }

    fn shutdown(&mut self) -> IoStatus<()> {
        (**self).shutdown()
    }

    fn received_shutdown(&mut self) -> bool {
        (**self).received_shutdown()
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }

    fn peer_certificate(&self) -> Option<X509> {
        (**self).peer_certificate()
    }

    fn cipher_name(&self) -> Option<String> {
        (**self).cipher_name()
    }

    fn pfs_details(&self) -> Option<String> {
        (**self).pfs_details()
    }
}

/// A TLS engine able to create client sessions
pub trait TlsProvider {
    type Session: TlsSession;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the engine accepts the cipher string
    fn supports_cipher_group(&self, cipher_group: &str) -> bool;

    /// Whether the engine can send Server Name Indication
    fn supports_sni(&self) -> bool {
        true
    }

    /// Whether subjectAltName entries can be recovered from peer certificates
    fn supports_subject_alt_name(&self) -> bool {
        true
    }

    /// Configure a context for `cipher_group` and bind a client session to `socket`
    ///
    /// The handshake is not started.
    fn client_session(
        &self,
        socket: RawSocket,
        options: &ContextOptions,
        cipher_group: &str,
        server_hostname: Option<&str>,
    ) -> Result<Self::Session>;
}
