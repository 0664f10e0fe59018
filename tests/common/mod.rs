//! Shared helpers: generated certificates, a loopback OpenSSL server and a
//! dialer that resolves every host to it

#![allow(dead_code)]

use alttls::net::Dialer;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod, SslStream};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509};
use socket2::Socket;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

/// A certificate and its private key
pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl Identity {
    /// Self-signed P-256 identity
    pub fn ec(cn: &str, dns_names: &[&str]) -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        Self::self_signed(key, cn, dns_names)
    }

    /// Self-signed RSA-2048 identity
    pub fn rsa(cn: &str, dns_names: &[&str]) -> Self {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        Self::self_signed(key, cn, dns_names)
    }

    fn self_signed(key: PKey<Private>, cn: &str, dns_names: &[&str]) -> Self {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
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
        Identity {
            cert: builder.build(),
            key,
        }
    }

    /// The certificate as a PEM trust store file
    pub fn trust_store(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.cert.to_pem().unwrap()).unwrap();
        file.flush().unwrap();
        file
    }

    /// Hex SHA-256 fingerprint of the certificate
    pub fn sha256_fingerprint(&self) -> String {
        let digest = hash(MessageDigest::sha256(), &self.cert.to_der().unwrap()).unwrap();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Acceptor builder serving this identity
    pub fn acceptor(&self) -> SslAcceptorBuilder {
        let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        acceptor.set_private_key(&self.key).unwrap();
        acceptor.set_certificate(&self.cert).unwrap();
        acceptor
    }
}

/// Serve `connections` TLS connections on loopback
///
/// Failed handshakes are skipped; `handler` runs for each successful one.
pub fn spawn_tls_server<F>(
    acceptor: SslAcceptorBuilder,
    connections: usize,
    handler: F,
) -> (SocketAddr, thread::JoinHandle<usize>)
where
    F: Fn(SslStream<TcpStream>) + Send + 'static,
{
    let acceptor = acceptor.build();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let mut handshakes = 0;
        for _ in 0..connections {
            let (stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            if let Ok(tls) = acceptor.accept(stream) {
                handshakes += 1;
                handler(tls);
            }
        }
        handshakes
    });

    (addr, handle)
}

/// Dialer that connects every host name to one address
pub struct FixedDialer(pub SocketAddr);

impl Dialer for FixedDialer {
    fn dial(
        &self,
        _host: &str,
        _port: u16,
        timeout: Option<Duration>,
        _source_address: Option<SocketAddr>,
    ) -> io::Result<Socket> {
        let stream = match timeout {
            Some(t) => TcpStream::connect_timeout(&self.0, t)?,
            None => TcpStream::connect(self.0)?,
        };
        stream.set_read_timeout(timeout)?;
        Ok(Socket::from(stream))
    }
}
