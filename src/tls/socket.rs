//! Blocking TLS socket
//!
//! `WrappedSocket` makes a TLS session usable wherever a blocking socket is
//! expected. The session runs over a non-blocking raw socket; whenever it
//! reports `WouldBlock`, the wrapper waits for readiness up to the socket's
//! timeout and retries the same step.
//!
//! Several buffered views may share one socket. Each open view holds a
//! count, and the TLS shutdown only happens once none remain.

use super::cert::{PeerCertificate, PeerCertificateView};
use super::config::TlsError;
use super::provider::{Direction, IoStatus, RecvFlags, SessionError, TlsSession};
use super::Result;
use crate::net::RawSocket;
use crate::session::{PollEvents, SessionOps};
use std::cell::RefCell;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

/// TLS session presented as a blocking socket
pub struct WrappedSocket<S: TlsSession> {
    session: S,
    socket: RawSocket,
    suppress_ragged_eofs: bool,
    subject_alt_name_support: bool,
    view_refs: usize,
    closed: bool,
}

impl<S: TlsSession> WrappedSocket<S> {
    /// Wrap an established session and the socket it runs over
    pub fn new(session: S, socket: RawSocket) -> Self {
        WrappedSocket {
            session,
            socket,
            suppress_ragged_eofs: true,
            subject_alt_name_support: true,
            view_refs: 0,
            closed: false,
        }
    }

    /// Report an EOF without close_notify as end of stream (default) or as an error
    pub fn suppress_ragged_eofs(mut self, suppress: bool) -> Self {
        self.suppress_ragged_eofs = suppress;
        self
    }

    /// Whether peer certificates can be searched for subjectAltName entries
    pub fn subject_alt_name_support(mut self, supported: bool) -> Self {
        self.subject_alt_name_support = supported;
        self
    }

    /// Read decrypted data, blocking up to the socket timeout
    ///
    /// Returns 0 at end of stream: after the peer's close_notify, or on a
    /// ragged EOF when those are suppressed.
    pub fn receive(&mut self, buf: &mut [u8], flags: RecvFlags) -> Result<usize> {
        loop {
            match self.session.recv(buf, flags) {
                IoStatus::Ready(n) => return Ok(n),
                IoStatus::WouldBlock(direction) => self.wait(direction)?,
                IoStatus::Failed(SessionError::RaggedEof) if self.suppress_ragged_eofs => {
                    return Ok(0)
                }
                IoStatus::Failed(SessionError::ZeroReturn) if self.session.received_shutdown() => {
                    return Ok(0)
                }
                IoStatus::Failed(e) => return Err(e.into()),
            }
        }
    }

    /// Send once, blocking until the session accepts at least part of `data`
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.session.send(data) {
                IoStatus::Ready(n) => return Ok(n),
                IoStatus::WouldBlock(direction) => self.wait(direction)?,
                IoStatus::Failed(e) => return Err(e.into()),
            }
        }
    }

    /// Send all of `data`
    pub fn send_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let sent = self.send(data)?;
            data = &data[sent..];
        }
        Ok(())
    }

    /// Close this handle
    ///
    /// With views outstanding this only gives back one count; otherwise the
    /// TLS session is shut down and the TCP connection closed.
    pub fn close(&mut self) -> Result<()> {
        if self.view_refs > 0 {
            self.view_refs -= 1;
            return Ok(());
        }

        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.session.shutdown() {
            IoStatus::Ready(()) | IoStatus::WouldBlock(_) => {}
            IoStatus::Failed(e) => tracing::debug!(error = %e, "TLS shutdown failed"),
        }

        self.socket.shutdown()?;
        Ok(())
    }

    /// Take one more count on the socket for an additional handle
    pub fn reuse(&mut self) {
        self.view_refs += 1;
    }

    /// Give back a count taken with `reuse`, closing once none remain
    pub fn release(&mut self) -> Result<()> {
        self.close()
    }

    /// Number of views still holding the socket open
    pub fn open_views(&self) -> usize {
        self.view_refs
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// DER encoding of the peer certificate
    pub fn peer_certificate_der(&self) -> Result<Option<Vec<u8>>> {
        match self.session.peer_certificate() {
            Some(cert) => Ok(Some(cert.to_der()?)),
            None => Ok(None),
        }
    }

    /// Common name and subjectAltName DNS entries of the peer certificate
    pub fn peer_certificate(&self) -> Option<PeerCertificateView> {
        self.session
            .peer_certificate()
            .map(|cert| PeerCertificateView::from_x509(&cert, self.subject_alt_name_support))
    }

    /// Peer certificate, DER encoded when `binary` is set
    pub fn get_peer_certificate(&self, binary: bool) -> Result<Option<PeerCertificate>> {
        if binary {
            Ok(self.peer_certificate_der()?.map(PeerCertificate::Binary))
        } else {
            Ok(self.peer_certificate().map(PeerCertificate::Structured))
        }
    }

    /// Set the timeout bounding every blocking wait (`None` waits forever)
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_timeout(timeout)?)
    }

    pub fn timeout(&self) -> Result<Option<Duration>> {
        Ok(self.socket.timeout()?)
    }

    /// Name of the negotiated cipher
    pub fn cipher_name(&self) -> Option<String> {
        self.session.cipher_name()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn raw_socket(&self) -> &RawSocket {
        &self.socket
    }

    /// Swap the session for another representation of it
    pub fn map_session<T: TlsSession>(self, f: impl FnOnce(S) -> T) -> WrappedSocket<T> {
        WrappedSocket {
            session: f(self.session),
            socket: self.socket,
            suppress_ragged_eofs: self.suppress_ragged_eofs,
            subject_alt_name_support: self.subject_alt_name_support,
            view_refs: self.view_refs,
            closed: self.closed,
        }
    }

    /// Move into shared ownership so views can be opened
    pub fn into_shared(self) -> SharedSocket<S> {
        SharedSocket {
            inner: Rc::new(RefCell::new(self)),
        }
    }

    fn wait(&self, direction: Direction) -> Result<()> {
        let timeout = self.socket.timeout()?;
        if self.socket.poll(direction.poll_events(), timeout)? {
            return Ok(());
        }

        Err(TlsError::Timeout(match direction {
            Direction::Read => "The read operation timed out".to_string(),
            Direction::Write => "The write operation timed out".to_string(),
        }))
    }
}

impl<S: TlsSession> AsRawFd for WrappedSocket<S> {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl<S: TlsSession> SessionOps for WrappedSocket<S> {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        // Plaintext already decrypted never shows up as socket readiness
        if events != PollEvents::Write && self.session.pending() > 0 {
            return Ok(true);
        }
        Ok(self.socket.poll(events, timeout)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.receive(buf, RecvFlags::NONE)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.send(buf)
    }

    fn close(&mut self) -> Result<()> {
        WrappedSocket::close(self)
    }
}

/// A `WrappedSocket` that views can be opened over
pub struct SharedSocket<S: TlsSession> {
    inner: Rc<RefCell<WrappedSocket<S>>>,
}

impl<S: TlsSession> SharedSocket<S> {
    /// Open a counted view; the socket stays up until every view is gone
    pub fn open_view(&self) -> SocketView<S> {
        self.inner.borrow_mut().reuse();
        SocketView {
            socket: Rc::clone(&self.inner),
            released: false,
        }
    }

    /// Close the owning handle (see `WrappedSocket::close`)
    pub fn close(&self) -> Result<()> {
        self.inner.borrow_mut().close()
    }

    /// Run `f` against the underlying socket
    pub fn with<R>(&self, f: impl FnOnce(&mut WrappedSocket<S>) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }
}

/// A counted handle over a shared socket, released on drop
pub struct SocketView<S: TlsSession> {
    socket: Rc<RefCell<WrappedSocket<S>>>,
    released: bool,
}

impl<S: TlsSession> SocketView<S> {
    /// Release the view now, surfacing any shutdown error
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.socket.borrow_mut().close()
    }
}

impl<S: TlsSession> Drop for SocketView<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::debug!(error = %e, "closing socket view failed");
        }
    }
}

impl<S: TlsSession> io::Read for SocketView<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.socket.borrow_mut().receive(buf, RecvFlags::NONE)?)
    }
}

impl<S: TlsSession> io::Write for SocketView<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.socket.borrow_mut().send(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: TlsSession> SessionOps for SocketView<S> {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        self.socket.borrow().poll(events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.socket.borrow_mut().receive(buf, RecvFlags::NONE)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.socket.borrow_mut().send(buf)
    }

    fn close(&mut self) -> Result<()> {
        self.release()
    }
}

impl From<TlsError> for io::Error {
    fn from(err: TlsError) -> Self {
        match err {
            TlsError::Io(e) | TlsError::Session(SessionError::Io(e)) => e,
            TlsError::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
