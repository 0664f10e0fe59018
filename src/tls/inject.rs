//! Backend activation
//!
//! HTTP code opens TLS connections through whatever [`TlsBackend`] sits in
//! its [`BackendSlot`]. [`inject_into`] swaps in the OpenSSL connector with
//! cipher downgrading; [`extract_from`] puts the previous backend back.

use super::ciphers::{CipherGroupList, DEFAULT_CIPHERS, DEFAULT_CIPHER_RANKING};
use super::connect::{ConnectionParams, Connector, VerifiedConnection};
use super::ossl::OpenSslProvider;
use super::provider::{TlsProvider, TlsSession};
use super::Result;
use crate::net::{Dialer, TcpDialer};
use std::sync::Arc;

/// Something able to open verified TLS connections
pub trait TlsBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether connections carry Server Name Indication
    fn has_sni(&self) -> bool;

    /// Open a verified connection
    fn connect(&self, params: &ConnectionParams)
        -> Result<VerifiedConnection<Box<dyn TlsSession>>>;
}

impl<P, D> TlsBackend for Connector<P, D>
where
    P: TlsProvider + Send + Sync,
    P::Session: 'static,
    D: Dialer + Send + Sync,
{
    fn name(&self) -> &str {
        self.provider().name()
    }

    fn has_sni(&self) -> bool {
        self.provider().supports_sni()
    }

    fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<VerifiedConnection<Box<dyn TlsSession>>> {
        let conn = Connector::connect(self, params)?;
        Ok(VerifiedConnection {
            socket: conn
                .socket
                .map_session(|session| Box::new(session) as Box<dyn TlsSession>),
            is_verified: conn.is_verified,
            warnings: conn.warnings,
            cipher_group: conn.cipher_group,
            attempts: conn.attempts,
            reusable: conn.reusable,
        })
    }
}

/// The backend in use, plus the one it replaced
pub struct BackendSlot {
    active: Arc<dyn TlsBackend>,
    replaced: Option<Arc<dyn TlsBackend>>,
}

impl BackendSlot {
    pub fn new(backend: Arc<dyn TlsBackend>) -> Self {
        BackendSlot {
            active: backend,
            replaced: None,
        }
    }

    /// The backend new connections go through
    pub fn active(&self) -> Arc<dyn TlsBackend> {
        Arc::clone(&self.active)
    }

    pub fn has_sni(&self) -> bool {
        self.active.has_sni()
    }

    /// Make `backend` active
    ///
    /// Only the first replaced backend is remembered, so repeated installs
    /// still restore the original one.
    pub fn install(&mut self, backend: Arc<dyn TlsBackend>) {
        let previous = std::mem::replace(&mut self.active, backend);
        if self.replaced.is_none() {
            self.replaced = Some(previous);
        }
    }

    /// Put the replaced backend back; does nothing if none was replaced
    pub fn restore(&mut self) {
        if let Some(previous) = self.replaced.take() {
            self.active = previous;
        }
    }

    /// Whether `install` has been called since the last restore
    pub fn is_injected(&self) -> bool {
        self.replaced.is_some()
    }
}

impl std::fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSlot")
            .field("active", &self.active.name())
            .field("replaced", &self.replaced.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

/// Activation settings
#[derive(Debug, Clone)]
pub struct InjectOptions {
    /// Try cipher groups from strongest to weakest instead of one default string
    pub strong_cipher_suites_first: bool,
    /// Candidate groups, strongest first
    pub ranking: Vec<String>,
}

impl Default for InjectOptions {
    fn default() -> Self {
        InjectOptions {
            strong_cipher_suites_first: true,
            ranking: DEFAULT_CIPHER_RANKING.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Cipher groups a connector built from `options` will try
///
/// Falls back to the single [`DEFAULT_CIPHERS`] string when downgrading is
/// off or the provider accepts none of the ranked groups.
pub fn select_cipher_groups<P: TlsProvider + ?Sized>(
    provider: &P,
    options: &InjectOptions,
) -> CipherGroupList {
    if options.strong_cipher_suites_first {
        let candidates: Vec<&str> = options.ranking.iter().map(String::as_str).collect();
        let probed = CipherGroupList::probe(provider, &candidates);
        if !probed.is_empty() {
            return probed;
        }
        tracing::warn!(
            provider = provider.name(),
            "no ranked cipher group is supported, not downgrading"
        );
    }
    CipherGroupList::single(DEFAULT_CIPHERS)
}

/// Install a connector for `provider` and `dialer` into `slot`
pub fn inject_provider_into<P, D>(
    slot: &mut BackendSlot,
    provider: P,
    dialer: D,
    options: &InjectOptions,
) -> CipherGroupList
where
    P: TlsProvider + Send + Sync + 'static,
    P::Session: 'static,
    D: Dialer + Send + Sync + 'static,
{
    let ciphers = select_cipher_groups(&provider, options);
    tracing::debug!(provider = provider.name(), groups = ciphers.len(), "installing TLS backend");
    slot.install(Arc::new(Connector::with_dialer(provider, dialer, ciphers.clone())));
    ciphers
}

/// Activate the OpenSSL backend over plain TCP
pub fn inject_into(slot: &mut BackendSlot, options: &InjectOptions) -> CipherGroupList {
    inject_provider_into(slot, OpenSslProvider::new(), TcpDialer, options)
}

/// Undo [`inject_into`]
pub fn extract_from(slot: &mut BackendSlot) {
    slot.restore();
}
