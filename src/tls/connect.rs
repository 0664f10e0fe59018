//! Downgrading connection setup
//!
//! Opens a fresh connection per cipher group, from the strongest group down,
//! until a handshake succeeds. Then applies the verification policy: a
//! pinned fingerprint if one is configured, hostname matching otherwise.

use super::cert::assert_fingerprint;
use super::ciphers::CipherGroupList;
use super::config::{CertReqs, ContextOptions, TlsError, TlsVersion};
use super::handshake::wrap_socket;
use super::hostname::match_hostname;
use super::provider::{TlsProvider, TlsSession};
use super::socket::WrappedSocket;
use super::Result;
use crate::net::{Dialer, RawSocket, TcpDialer};
use crate::tunnel::{establish_tunnel, TunnelTarget};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 2014-01-01T00:00:00Z; a system clock before this is certainly wrong
pub const RECENT_DATE_UNIX: u64 = 1_388_534_400;

/// Whether `now` predates [`RECENT_DATE_UNIX`]
pub fn system_time_is_off(now: SystemTime) -> bool {
    match now.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => since_epoch.as_secs() < RECENT_DATE_UNIX,
        Err(_) => true,
    }
}

/// Non-fatal security conditions noticed while connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityWarning {
    /// The system clock is before [`RECENT_DATE_UNIX`]
    SystemTimeOff,
    /// The certificate has no subjectAltName; the common name was used instead
    NoSubjectAltName { hostname: String },
}

impl fmt::Display for SecurityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityWarning::SystemTimeOff => write!(
                f,
                "System time is way off (before 2014-01-01). \
                 This will probably lead to certificate verification errors"
            ),
            SecurityWarning::NoSubjectAltName { hostname } => write!(
                f,
                "Certificate for {} has no subjectAltName, falling back to check for a \
                 commonName for now. This feature is being removed by major browsers and \
                 deprecated by RFC 2818",
                hostname
            ),
        }
    }
}

/// Hostname verification mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostnameCheck {
    /// Check against the connection host (or the tunnel host)
    #[default]
    Default,
    /// Skip hostname verification
    Disabled,
    /// Check against this name instead
    Expect(String),
}

/// Everything needed to open one verified TLS connection
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    source_address: Option<SocketAddr>,
    options: ContextOptions,
    assert_hostname: HostnameCheck,
    assert_fingerprint: Option<String>,
    tunnel: Option<TunnelTarget>,
}

impl ConnectionParams {
    /// Create a builder for a connection to `host:port`
    pub fn builder(host: impl Into<String>, port: u16) -> ConnectionParamsBuilder {
        ConnectionParamsBuilder {
            params: ConnectionParams {
                host: host.into(),
                port,
                timeout: None,
                source_address: None,
                options: ContextOptions::default(),
                assert_hostname: HostnameCheck::Default,
                assert_fingerprint: None,
                tunnel: None,
            },
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn assert_hostname(&self) -> &HostnameCheck {
        &self.assert_hostname
    }

    pub fn tunnel(&self) -> Option<&TunnelTarget> {
        self.tunnel.as_ref()
    }
}

/// Connection parameters builder
#[derive(Debug, Clone)]
pub struct ConnectionParamsBuilder {
    params: ConnectionParams,
}

impl ConnectionParamsBuilder {
    /// Timeout for connecting and for every blocking wait afterwards
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.params.timeout = Some(timeout);
        self
    }

    /// Local address to bind before connecting
    pub fn source_address(mut self, addr: SocketAddr) -> Self {
        self.params.source_address = Some(addr);
        self
    }

    /// Client certificate (PEM)
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.options.cert_file = Some(path.into());
        self
    }

    /// Client private key (PEM)
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.options.key_file = Some(path.into());
        self
    }

    pub fn cert_reqs(mut self, reqs: CertReqs) -> Self {
        self.params.options.cert_reqs = reqs;
        self
    }

    /// Trust store file (PEM)
    pub fn ca_certs(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.options.ca_certs = Some(path.into());
        self
    }

    pub fn version(mut self, version: TlsVersion) -> Self {
        self.params.options.version = Some(version);
        self
    }

    /// Replace all TLS context options at once
    pub fn options(mut self, options: ContextOptions) -> Self {
        self.params.options = options;
        self
    }

    pub fn assert_hostname(mut self, check: HostnameCheck) -> Self {
        self.params.assert_hostname = check;
        self
    }

    /// Pin the peer certificate by its hex fingerprint
    pub fn assert_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.params.assert_fingerprint = Some(fingerprint.into());
        self
    }

    /// Connect through a proxy tunnel to `target`
    pub fn tunnel(mut self, target: TunnelTarget) -> Self {
        self.params.tunnel = Some(target);
        self
    }

    pub fn build(self) -> ConnectionParams {
        self.params
    }
}

/// An established, policy-checked TLS connection
pub struct VerifiedConnection<S: TlsSession> {
    pub socket: WrappedSocket<S>,
    /// Full certificate verification or a fingerprint pin was in effect
    pub is_verified: bool,
    pub warnings: Vec<SecurityWarning>,
    /// Cipher group the handshake succeeded with
    pub cipher_group: String,
    /// Handshake attempts made, including the successful one
    pub attempts: usize,
    /// False when the connection runs through a tunnel
    pub reusable: bool,
}

impl<S: TlsSession> fmt::Debug for VerifiedConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedConnection")
            .field("is_verified", &self.is_verified)
            .field("warnings", &self.warnings)
            .field("cipher_group", &self.cipher_group)
            .field("attempts", &self.attempts)
            .field("reusable", &self.reusable)
            .finish()
    }
}

fn warn(warnings: &mut Vec<SecurityWarning>, warning: SecurityWarning) {
    tracing::warn!("{}", warning);
    warnings.push(warning);
}

/// Connect, downgrading through `ciphers` until a handshake succeeds
///
/// Only retryable failures (see [`TlsError::is_retryable`]) move on to the
/// next group. If every group fails, the error of the last attempt is
/// returned inside [`TlsError::ExhaustedRetries`].
pub fn connect_with_downgrade<P, D>(
    provider: &P,
    dialer: &D,
    ciphers: &CipherGroupList,
    params: &ConnectionParams,
) -> Result<VerifiedConnection<P::Session>>
where
    P: TlsProvider + ?Sized,
    D: Dialer + ?Sized,
{
    let mut warnings = Vec::new();
    if system_time_is_off(SystemTime::now()) {
        warn(&mut warnings, SecurityWarning::SystemTimeOff);
    }

    let mut hostname = params.host.clone();
    let mut reusable = true;
    let mut last_error = None;
    let mut attempts = 0;
    let mut established = None;

    for cipher_group in ciphers.iter() {
        attempts += 1;
        tracing::debug!(
            attempt = attempts,
            cipher_group,
            host = %params.host,
            "trying cipher group"
        );

        let socket = dialer.dial(&params.host, params.port, params.timeout, params.source_address)?;

        if let Some(tunnel) = &params.tunnel {
            establish_tunnel(&socket, tunnel)?;
            reusable = false;
            hostname = tunnel.host.clone();
        }

        let raw = RawSocket::new(socket)?;
        raw.set_timeout(params.timeout)?;

        match wrap_socket(provider, raw, &params.options, Some(cipher_group), Some(&hostname)) {
            Ok(socket) => {
                established = Some((socket, cipher_group.to_string()));
                break;
            }
            Err(e) if e.is_retryable() => {
                tracing::debug!(
                    attempt = attempts,
                    cipher_group,
                    error = %e,
                    "cipher group rejected"
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    let (mut socket, cipher_group) = match established {
        Some(established) => established,
        None => {
            return Err(match last_error {
                Some(last) => TlsError::ExhaustedRetries {
                    attempts,
                    last: Box::new(last),
                },
                None => TlsError::Configuration("no cipher groups to try".into()),
            })
        }
    };

    if let Err(e) = verify_peer(&socket, params, &hostname, &mut warnings) {
        if let Err(close_err) = socket.close() {
            tracing::debug!(error = %close_err, "closing rejected connection failed");
        }
        return Err(e);
    }

    let cert_reqs = params.options.cert_reqs();
    Ok(VerifiedConnection {
        socket,
        is_verified: cert_reqs == CertReqs::Required || params.assert_fingerprint.is_some(),
        warnings,
        cipher_group,
        attempts,
        reusable,
    })
}

/// Apply the post-handshake verification policy
fn verify_peer<S: TlsSession>(
    socket: &WrappedSocket<S>,
    params: &ConnectionParams,
    hostname: &str,
    warnings: &mut Vec<SecurityWarning>,
) -> Result<()> {
    if let Some(fingerprint) = &params.assert_fingerprint {
        let der = socket.peer_certificate_der()?.ok_or_else(|| {
            TlsError::Verification("peer presented no certificate to pin".into())
        })?;
        return assert_fingerprint(&der, fingerprint);
    }

    if params.options.cert_reqs() == CertReqs::None {
        return Ok(());
    }

    let expected = match &params.assert_hostname {
        HostnameCheck::Disabled => return Ok(()),
        HostnameCheck::Default => hostname,
        HostnameCheck::Expect(name) => name.as_str(),
    };

    let cert = socket.peer_certificate().unwrap_or_default();
    if !cert.has_subject_alt_name() {
        warn(
            warnings,
            SecurityWarning::NoSubjectAltName {
                hostname: expected.to_string(),
            },
        );
    }

    match_hostname(&cert, expected)
}

/// A provider and a dialer bound to a ranked cipher list
pub struct Connector<P: TlsProvider, D: Dialer = TcpDialer> {
    provider: P,
    dialer: D,
    ciphers: CipherGroupList,
}

impl<P: TlsProvider> Connector<P, TcpDialer> {
    /// Connector dialing plain TCP
    pub fn new(provider: P, ciphers: CipherGroupList) -> Self {
        Connector {
            provider,
            dialer: TcpDialer,
            ciphers,
        }
    }
}

impl<P: TlsProvider, D: Dialer> Connector<P, D> {
    /// Connector opening raw connections through `dialer`
    pub fn with_dialer(provider: P, dialer: D, ciphers: CipherGroupList) -> Self {
        Connector {
            provider,
            dialer,
            ciphers,
        }
    }

    /// Open a verified connection (see [`connect_with_downgrade`])
    pub fn connect(&self, params: &ConnectionParams) -> Result<VerifiedConnection<P::Session>> {
        connect_with_downgrade(&self.provider, &self.dialer, &self.ciphers, params)
    }

    pub fn cipher_groups(&self) -> &CipherGroupList {
        &self.ciphers
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }
}
