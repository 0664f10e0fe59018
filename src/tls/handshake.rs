//! TLS handshake
//!
//! Drives one client handshake over a single cipher group. The provider
//! reports every stall as `WouldBlock`; the loop waits for the socket to
//! become ready and steps again, with all waits sharing one deadline taken
//! from the socket timeout.

use super::ciphers::DEFAULT_CIPHERS;
use super::config::{ContextOptions, TlsError};
use super::provider::{Direction, IoStatus, TlsProvider, TlsSession};
use super::socket::WrappedSocket;
use super::Result;
use crate::net::RawSocket;
use std::time::{Duration, Instant};

/// Handshake progress
enum State {
    Connecting,
    WaitingReadable,
    WaitingWritable,
    Handshaked,
    Failed(TlsError),
}

/// Remaining time before a deadline (`None` means no deadline)
fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

/// Perform a client handshake and wrap the result as a blocking socket
///
/// `cipher_group` defaults to [`DEFAULT_CIPHERS`]. SNI is only sent when the
/// provider supports it.
pub fn wrap_socket<P: TlsProvider + ?Sized>(
    provider: &P,
    socket: RawSocket,
    options: &ContextOptions,
    cipher_group: Option<&str>,
    server_hostname: Option<&str>,
) -> Result<WrappedSocket<P::Session>> {
    let cipher_group = cipher_group.unwrap_or(DEFAULT_CIPHERS);
    let sni = server_hostname.filter(|_| provider.supports_sni());

    let mut session = provider.client_session(socket.clone(), options, cipher_group, sni)?;
    let deadline = socket.timeout()?.map(|t| Instant::now() + t);

    let wait = |direction: Direction| match socket
        .poll(direction.poll_events(), remaining(deadline))
    {
        Ok(true) => State::Connecting,
        Ok(false) => State::Failed(TlsError::Timeout("select timed out".to_string())),
        Err(e) => State::Failed(e.into()),
    };

    let mut state = State::Connecting;
    loop {
        state = match state {
            State::Connecting => match session.handshake() {
                IoStatus::Ready(()) => State::Handshaked,
                IoStatus::WouldBlock(Direction::Read) => State::WaitingReadable,
                IoStatus::WouldBlock(Direction::Write) => State::WaitingWritable,
                IoStatus::Failed(e) => {
                    State::Failed(TlsError::Handshake(format!("bad handshake: {}", e)))
                }
            },
            State::WaitingReadable => wait(Direction::Read),
            State::WaitingWritable => wait(Direction::Write),
            State::Handshaked => break,
            State::Failed(e) => {
                tracing::debug!(
                    provider = provider.name(),
                    cipher_group,
                    error = %e,
                    "handshake failed"
                );
                return Err(e);
            }
        };
    }

    tracing::debug!(
        provider = provider.name(),
        cipher_group,
        cipher = session.cipher_name().as_deref().unwrap_or("unknown"),
        pfs = session.pfs_details().as_deref().unwrap_or("none"),
        "negotiated"
    );

    Ok(WrappedSocket::new(session, socket)
        .subject_alt_name_support(provider.supports_subject_alt_name()))
}
