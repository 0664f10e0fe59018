//! OpenSSL-backed TLS provider
//!
//! Builds one `SslContext` per handshake attempt from the connection's
//! `ContextOptions` and the cipher group being tried, and maps OpenSSL's
//! error codes onto the provider contract's `IoStatus`.

use super::config::{CertReqs, ContextOptions, TlsError};
use super::provider::{Direction, IoStatus, RecvFlags, SessionError, TlsProvider, TlsSession};
use super::Result;
use crate::net::RawSocket;
use openssl::ssl::{
    self, ErrorCode, ShutdownState, Ssl, SslContext, SslContextBuilder, SslFiletype, SslMethod,
    SslOptions, SslStream, SslVerifyMode,
};
use openssl::x509::{X509VerifyResult, X509};

/// Reason string OpenSSL 3 reports for a ragged EOF
const UNEXPECTED_EOF_REASON: &str = "unexpected eof while reading";

/// TLS provider using the system OpenSSL
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslProvider;

impl OpenSslProvider {
    pub fn new() -> Self {
        OpenSslProvider
    }

    /// Build a client context for one handshake attempt
    pub fn build_context(
        &self,
        options: &ContextOptions,
        cipher_group: &str,
    ) -> Result<SslContext> {
        let mut ctx = SslContextBuilder::new(SslMethod::tls_client())?;

        if let Some(version) = options.version() {
            ctx.set_min_proto_version(Some(version.to_openssl_version()))?;
            ctx.set_max_proto_version(Some(version.to_openssl_version()))?;
        }

        if let Some(cert_file) = options.cert_file() {
            ctx.set_certificate_file(cert_file, SslFiletype::PEM).map_err(|e| {
                TlsError::Configuration(format!("bad cert_file {:?}: {}", cert_file, e))
            })?;
        }

        if let Some(key_file) = options.key_file() {
            ctx.set_private_key_file(key_file, SslFiletype::PEM).map_err(|e| {
                TlsError::Configuration(format!("bad key_file {:?}: {}", key_file, e))
            })?;
        }

        match options.cert_reqs() {
            CertReqs::None => ctx.set_verify(SslVerifyMode::NONE),
            reqs => {
                let mode = if reqs == CertReqs::Required {
                    SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
                } else {
                    SslVerifyMode::PEER
                };
                // Trust only what the standard chain validation accepted
                ctx.set_verify_callback(mode, |preverify_ok, store| {
                    preverify_ok && store.error() == X509VerifyResult::OK
                });
            }
        }

        match options.ca_certs() {
            Some(ca_certs) => ctx.set_ca_file(ca_certs).map_err(|e| {
                TlsError::Configuration(format!("bad ca_certs {:?}: {}", ca_certs, e))
            })?,
            None => ctx.set_default_verify_paths().map_err(|e| {
                TlsError::Configuration(format!("bad default trust store: {}", e))
            })?,
        }

        // Compression enables CRIME-style record layer attacks
        ctx.set_options(SslOptions::NO_COMPRESSION);

        ctx.set_cipher_list(cipher_group)
            .map_err(|_| TlsError::UnsupportedCipherGroup(cipher_group.to_string()))?;

        Ok(ctx.build())
    }
}

impl TlsProvider for OpenSslProvider {
    type Session = OpenSslSession;

    fn name(&self) -> &'static str {
        "openssl"
    }

    fn supports_cipher_group(&self, cipher_group: &str) -> bool {
        SslContextBuilder::new(SslMethod::tls())
            .and_then(|mut ctx| ctx.set_cipher_list(cipher_group))
            .is_ok()
    }

    fn client_session(
        &self,
        socket: RawSocket,
        options: &ContextOptions,
        cipher_group: &str,
        server_hostname: Option<&str>,
    ) -> Result<OpenSslSession> {
        let ctx = self.build_context(options, cipher_group)?;
        let mut ssl = Ssl::new(&ctx)?;

        if let Some(hostname) = server_hostname {
            ssl.set_hostname(hostname)?;
        }
        ssl.set_connect_state();

        Ok(OpenSslSession {
            stream: SslStream::new(ssl, socket)?,
        })
    }
}

/// A client session driven step by step over a non-blocking socket
pub struct OpenSslSession {
    stream: SslStream<RawSocket>,
}

impl OpenSslSession {
    /// Negotiated protocol version (e.g. "TLSv1.3")
    pub fn version(&self) -> &'static str {
        self.stream.ssl().version_str()
    }

    pub fn get_ref(&self) -> &RawSocket {
        self.stream.get_ref()
    }
}

/// Map an OpenSSL error onto the provider contract
fn classify<T>(err: ssl::Error) -> IoStatus<T> {
    match err.code() {
        ErrorCode::WANT_READ => IoStatus::WouldBlock(Direction::Read),
        ErrorCode::WANT_WRITE => IoStatus::WouldBlock(Direction::Write),
        ErrorCode::ZERO_RETURN => IoStatus::Failed(SessionError::ZeroReturn),
        ErrorCode::SYSCALL => match err.into_io_error() {
            Ok(io) if io.kind() == std::io::ErrorKind::WouldBlock => {
                IoStatus::WouldBlock(Direction::Read)
            }
            Ok(io) => IoStatus::Failed(SessionError::Io(io)),
            // SYSCALL without an errno is EOF without close_notify
            Err(_) => IoStatus::Failed(SessionError::RaggedEof),
        },
        ErrorCode::SSL if is_unexpected_eof(&err) => IoStatus::Failed(SessionError::RaggedEof),
        _ => IoStatus::Failed(SessionError::Protocol(err.to_string())),
    }
}

fn is_unexpected_eof(err: &ssl::Error) -> bool {
    err.ssl_error().map_or(false, |stack| {
        stack
            .errors()
            .iter()
            .any(|e| e.reason() == Some(UNEXPECTED_EOF_REASON))
    })
}

impl TlsSession for OpenSslSession {
    fn handshake(&mut self) -> IoStatus<()> {
        match self.stream.do_handshake() {
            Ok(()) => IoStatus::Ready(()),
            Err(e) => classify(e),
        }
    }

    fn recv(&mut self, buf: &mut [u8], flags: RecvFlags) -> IoStatus<usize> {
        let result = if flags.peek {
            self.stream.ssl_peek(buf)
        } else {
            self.stream.ssl_read(buf)
        };

        match result {
            Ok(n) => IoStatus::Ready(n),
            Err(e) => classify(e),
        }
    }

    fn send(&mut self, data: &[u8]) -> IoStatus<usize> {
        match self.stream.ssl_write(data) {
            Ok(n) => IoStatus::Ready(n),
            Err(e) => classify(e),
        }
    }

    fn shutdown(&mut self) -> IoStatus<()> {
        match self.stream.shutdown() {
            Ok(_) => IoStatus::Ready(()),
            Err(e) => classify(e),
        }
    }

    fn received_shutdown(&mut self) -> bool {
        self.stream.get_shutdown().contains(ShutdownState::RECEIVED)
    }

    fn pending(&self) -> usize {
        self.stream.ssl().pending()
    }

    fn peer_certificate(&self) -> Option<X509> {
        self.stream.ssl().peer_certificate()
    }

    fn cipher_name(&self) -> Option<String> {
        self.stream
            .ssl()
            .current_cipher()
            .map(|c| c.name().to_string())
    }

    fn pfs_details(&self) -> Option<String> {
        let cipher = self.stream.ssl().current_cipher()?;
        let description = cipher.description();
        let kx = description
            .split_whitespace()
            .find_map(|field| field.strip_prefix("Kx="))?;

        // TLS 1.3 suites report "any", their key exchange is always ephemeral
        match kx {
            "ECDH" | "DH" | "ECDHEPSK" | "DHEPSK" | "any" => {
                Some(format!("{} key exchange ({})", kx, self.version()))
            }
            _ => None,
        }
    }
}
