//! Raw transport sockets
//!
//! `RawSocket` is the plain TCP socket underneath a TLS session. The session
//! and the blocking adapter each hold a clone of it: the session moves bytes
//! through it, the adapter waits on its readiness. Once wrapped, the socket
//! is non-blocking; the caller's timeout is kept alongside it, shared by all
//! clones, and bounds every readiness wait.

use crate::session::{poll_fd, PollEvents};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared handle to the socket underneath a TLS session
#[derive(Debug, Clone)]
pub struct RawSocket {
    inner: Arc<Socket>,
    timeout: Arc<Mutex<Option<Duration>>>,
}

impl RawSocket {
    /// Take ownership of a connected socket and switch it to non-blocking mode
    ///
    /// A read timeout already configured on the socket becomes the initial
    /// wait timeout.
    pub fn new(socket: Socket) -> io::Result<Self> {
        let timeout = socket.read_timeout()?;
        socket.set_nonblocking(true)?;
        Ok(RawSocket {
            inner: Arc::new(socket),
            timeout: Arc::new(Mutex::new(timeout)),
        })
    }

    /// Wrap an already connected `TcpStream`, keeping its configured timeout
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        Self::new(Socket::from(stream))
    }

    /// Set the timeout applied to every readiness wait
    ///
    /// `None` means wait forever. A zero duration polls once and times out
    /// if the socket is not ready.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner) = timeout;
        Ok(())
    }

    /// The timeout applied to readiness waits
    pub fn timeout(&self) -> io::Result<Option<Duration>> {
        Ok(*self.timeout.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait for readiness, returns `false` if `timeout` elapsed first
    pub fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
        poll_fd(self.inner.as_raw_fd(), events, timeout)
    }

    /// Shut down both directions of the TCP connection
    pub fn shutdown(&self) -> io::Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner
            .peer_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "peer is not an IP socket"))
    }
}

impl Read for RawSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.inner).read(buf)
    }
}

impl Write for RawSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.inner).flush()
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// Opens the raw connection for each handshake attempt
pub trait Dialer {
    /// Connect to `host:port` and return a blocking socket
    fn dial(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        source_address: Option<SocketAddr>,
    ) -> io::Result<Socket>;
}

/// Plain TCP dialer
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl TcpDialer {
    fn connect_addr(
        addr: SocketAddr,
        timeout: Option<Duration>,
        source_address: Option<SocketAddr>,
    ) -> io::Result<Socket> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

        if let Some(source) = source_address {
            socket.bind(&SockAddr::from(source))?;
        }

        let target = SockAddr::from(addr);
        match timeout {
            Some(t) if !t.is_zero() => socket.connect_timeout(&target, t)?,
            _ => socket.connect(&target)?,
        }

        socket.set_nodelay(true)?;
        if let Some(t) = timeout.filter(|t| !t.is_zero()) {
            socket.set_read_timeout(Some(t))?;
            socket.set_write_timeout(Some(t))?;
        }

        Ok(socket)
    }
}

impl Dialer for TcpDialer {
    fn dial(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        source_address: Option<SocketAddr>,
    ) -> io::Result<Socket> {
        let mut last_err = None;

        for addr in (host, port).to_socket_addrs()? {
            match Self::connect_addr(addr, timeout, source_address) {
                Ok(socket) => return Ok(socket),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}:{}", host, port),
            )
        }))
    }
}
