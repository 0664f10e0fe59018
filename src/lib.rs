//! alttls - blocking TLS transport with cipher downgrading
//!
//! This crate provides a TLS client transport for HTTP code written against
//! blocking sockets: an OpenSSL-backed session adapter, a handshake loop
//! that falls back through ranked cipher groups, and peer verification by
//! hostname or pinned fingerprint.

pub mod net;
pub mod session;
pub mod tls;
pub mod tunnel;
