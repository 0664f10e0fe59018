//! Test doubles: throwaway certificates, scripted sessions and providers

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};
use socket2::Socket;
use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::config::ContextOptions;
use super::provider::{IoStatus, RecvFlags, SessionError, TlsProvider, TlsSession};
use super::Result;
use crate::net::{Dialer, RawSocket};

/// Self-signed P-256 certificate with the given common name and DNS SANs
pub fn self_signed(cn: &str, dns_names: &[&str]) -> (X509, PKey<Private>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();

    if !dns_names.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for dns in dns_names {
            san.dns(dns);
        }
        let ext = san.build(&builder.x509v3_context(None, None)).unwrap();
        builder.append_extension(ext).unwrap();
    }

    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

/// Session whose every step is scripted up front
///
/// Empty scripts fall back to success: handshakes complete, receives report
/// EOF and sends accept everything offered.
#[derive(Default)]
pub struct ScriptedSession {
    pub handshake_script: VecDeque<IoStatus<()>>,
    pub recv_script: VecDeque<IoStatus<Vec<u8>>>,
    pub send_script: VecDeque<IoStatus<usize>>,
    /// Bytes accepted by `send`, in order
    pub sent: Vec<u8>,
    /// Length of the buffer offered to each `send` call
    pub send_offers: Vec<usize>,
    pub recv_calls: usize,
    pub shutdown_calls: usize,
    pub received_shutdown: bool,
    /// Reported as buffered plaintext
    pub pending: usize,
    pub certificate: Option<X509>,
}

impl TlsSession for ScriptedSession {
    fn handshake(&mut self) -> IoStatus<()> {
        self.handshake_script.pop_front().unwrap_or(IoStatus::Ready(()))
    }

    fn recv(&mut self, buf: &mut [u8], _flags: RecvFlags) -> IoStatus<usize> {
        self.recv_calls += 1;
        match self.recv_script.pop_front() {
            Some(IoStatus::Ready(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                IoStatus::Ready(n)
            }
            Some(IoStatus::WouldBlock(direction)) => IoStatus::WouldBlock(direction),
            Some(IoStatus::Failed(e)) => IoStatus::Failed(e),
            None => IoStatus::Ready(0),
        }
    }

    fn send(&mut self, data: &[u8]) -> IoStatus<usize> {
        self.send_offers.push(data.len());
        match self.send_script.pop_front().unwrap_or(IoStatus::Ready(data.len())) {
            IoStatus::Ready(n) => {
                let n = n.min(data.len());
                self.sent.extend_from_slice(&data[..n]);
                IoStatus::Ready(n)
            }
            other => other,
        }
    }

    fn shutdown(&mut self) -> IoStatus<()> {
        self.shutdown_calls += 1;
        IoStatus::Ready(())
    }

    fn received_shutdown(&mut self) -> bool {
        self.received_shutdown
    }

    fn pending(&self) -> usize {
        self.pending
    }

    fn peer_certificate(&self) -> Option<X509> {
        self.certificate.clone()
    }

    fn cipher_name(&self) -> Option<String> {
        Some("SCRIPTED-CIPHER".to_string())
    }
}

/// What a `ScriptedProvider` was asked to do
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProviderLog {
    /// Cipher group of each session created, in order
    pub cipher_groups: Vec<String>,
    /// SNI name handed to each session
    pub server_hostnames: Vec<Option<String>>,
}

/// Provider whose handshakes fail for a fixed set of cipher groups
pub struct ScriptedProvider {
    pub failing_groups: Vec<String>,
    pub sni: bool,
    pub subject_alt_name: bool,
    pub certificate: Option<X509>,
    pub log: Mutex<ProviderLog>,
}

impl ScriptedProvider {
    pub fn new(failing_groups: &[&str], certificate: Option<X509>) -> Self {
        ScriptedProvider {
            failing_groups: failing_groups.iter().map(|g| g.to_string()).collect(),
            sni: true,
            subject_alt_name: true,
            certificate,
            log: Mutex::new(ProviderLog::default()),
        }
    }

    pub fn log(&self) -> ProviderLog {
        self.log.lock().unwrap().clone()
    }
}

impl TlsProvider for ScriptedProvider {
    type Session = ScriptedSession;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports_cipher_group(&self, cipher_group: &str) -> bool {
        !cipher_group.contains("RC4")
    }

    fn supports_sni(&self) -> bool {
        self.sni
    }

    fn supports_subject_alt_name(&self) -> bool {
        self.subject_alt_name
    }

    fn client_session(
        &self,
        _socket: RawSocket,
        _options: &ContextOptions,
        cipher_group: &str,
        server_hostname: Option<&str>,
    ) -> Result<ScriptedSession> {
        let mut log = self.log.lock().unwrap();
        log.cipher_groups.push(cipher_group.to_string());
        log.server_hostnames.push(server_hostname.map(str::to_string));

        let mut session = ScriptedSession {
            certificate: self.certificate.clone(),
            ..ScriptedSession::default()
        };
        if self.failing_groups.iter().any(|g| g == cipher_group) {
            session.handshake_script.push_back(IoStatus::Failed(SessionError::Protocol(format!(
                "no shared cipher for {}",
                cipher_group
            ))));
        }
        Ok(session)
    }
}

/// Dialer that connects every request to its own idle loopback listener
pub struct LoopbackDialer {
    listener: TcpListener,
    pub dials: AtomicUsize,
}

impl LoopbackDialer {
    pub fn new() -> Self {
        LoopbackDialer {
            listener: TcpListener::bind("127.0.0.1:0").unwrap(),
            dials: AtomicUsize::new(0),
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Dialer for LoopbackDialer {
    fn dial(
        &self,
        _host: &str,
        _port: u16,
        _timeout: Option<Duration>,
        _source_address: Option<SocketAddr>,
    ) -> io::Result<Socket> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let stream = TcpStream::connect(self.listener.local_addr()?)?;
        Ok(Socket::from(stream))
    }
}

/// A raw socket plus the peer end of the same connection
pub fn socket_pair() -> (RawSocket, UnixStream) {
    let (ours, theirs) = UnixStream::pair().unwrap();
    (RawSocket::new(Socket::from(ours)).unwrap(), theirs)
}
