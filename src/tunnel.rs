//! HTTP CONNECT tunnels
//!
//! When a connection goes through a proxy, the freshly dialed socket is
//! first turned into a tunnel to the real target with an HTTP/1.1 CONNECT
//! request. The TLS handshake then runs through the tunnel.

use crate::tls::{Result, TlsError};
use socket2::Socket;
use std::io::{Read, Write};

/// Upper bound on the proxy's response head
const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// Target a proxy tunnel is opened to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    pub host: String,
    pub port: u16,
    /// Extra request headers (e.g. Proxy-Authorization)
    pub headers: Vec<(String, String)>,
}

impl TunnelTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TunnelTarget {
            host: host.into(),
            port,
            headers: Vec::new(),
        }
    }

    /// Add a header to the CONNECT request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn request(&self) -> String {
        let authority = self.authority();
        let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", authority, authority);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }
}

/// Open a tunnel to `target` over a connected, blocking socket
///
/// Only a 200 response establishes the tunnel. Everything the proxy sends
/// after the response head belongs to the tunneled stream, so the head is
/// read one byte at a time.
pub fn establish_tunnel(socket: &Socket, target: &TunnelTarget) -> Result<()> {
    let mut stream = socket;
    stream
        .write_all(target.request().as_bytes())
        .map_err(|e| TlsError::Tunnel(format!("sending CONNECT failed: {}", e)))?;

    let head = read_response_head(stream)?;
    let status_line = head.lines().next().unwrap_or_default();
    let status = parse_status(status_line)?;

    if status != 200 {
        return Err(TlsError::Tunnel(format!(
            "proxy refused CONNECT to {}: {}",
            target.authority(),
            status_line.trim()
        )));
    }

    tracing::debug!(tunnel = %target.authority(), "tunnel established");
    Ok(())
}

fn read_response_head(mut stream: &Socket) -> Result<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(TlsError::Tunnel("proxy response head too large".into()));
        }
        match stream.read(&mut byte) {
            Ok(0) => {
                return Err(TlsError::Tunnel(
                    "proxy closed the connection during CONNECT".into(),
                ))
            }
            Ok(_) => head.push(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TlsError::Tunnel(format!("reading CONNECT response: {}", e))),
        }
    }

    String::from_utf8(head).map_err(|_| TlsError::Tunnel("proxy response is not text".into()))
}

/// Parse the status code out of `HTTP/1.x CODE REASON`
fn parse_status(line: &str) -> Result<u16> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(TlsError::Tunnel(format!("invalid status line: {:?}", line)));
    }

    parts
        .next()
        .and_then(|code| code.trim().parse::<u16>().ok())
        .ok_or_else(|| TlsError::Tunnel(format!("invalid status line: {:?}", line)))
}
