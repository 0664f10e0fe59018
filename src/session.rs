//! Session operations abstraction
//!
//! This module provides the blocking-socket interface the HTTP layer is
//! written against. A TLS-wrapped socket implements the same operations as
//! a plain one, so the HTTP code never needs to know which transport it is
//! driving.

use crate::tls::Result;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Session operations trait
///
/// This trait defines the operations that can be performed on a session,
/// abstracting over plain TCP and TLS connections.
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Wait until `fd` is ready for `events`.
///
/// `None` waits forever. Returns `false` when the timeout expired first.
pub fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| {
            // Round sub-millisecond waits up so they don't degrade into a spin.
            let ms = d.as_millis().min(i32::MAX as u128) as i32;
            if ms == 0 && !d.is_zero() { 1 } else { ms }
        })
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        return Ok(result > 0);
    }
}
