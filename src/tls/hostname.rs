//! Hostname verification against a peer certificate view.

use super::cert::PeerCertificateView;
use super::config::TlsError;
use super::Result;

/// Verify that `cert` is valid for `hostname`.
///
/// 1. subjectAltName DNS entries are checked first.
/// 2. The common name is consulted only when there is no DNS entry at all.
/// 3. One wildcard is allowed, in the left-most label only.
pub fn match_hostname(cert: &PeerCertificateView, hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        return Err(TlsError::Verification("empty hostname".into()));
    }

    let mut candidates: Vec<&str> = Vec::new();

    for dns_name in &cert.dns_names {
        if dns_name_matches(dns_name, hostname)? {
            return Ok(());
        }
        candidates.push(dns_name);
    }

    if cert.dns_names.is_empty() {
        if let Some(cn) = cert.common_name.as_deref() {
            if dns_name_matches(cn, hostname)? {
                return Ok(());
            }
            candidates.push(cn);
        }
    }

    let reason = match candidates.as_slice() {
        [] => "no appropriate commonName or subjectAltName fields were found".to_string(),
        [only] => format!("hostname {:?} doesn't match {:?}", hostname, only),
        many => format!(
            "hostname {:?} doesn't match either of {}",
            hostname,
            many.iter().map(|n| format!("{:?}", n)).collect::<Vec<_>>().join(", ")
        ),
    };

    Err(TlsError::Verification(reason))
}

/// Match one certificate name (possibly a wildcard pattern) against `hostname`.
///
/// - `*` as the whole left-most label matches exactly one non-empty label
/// - a partial wildcard (`f*.example.com`) matches within the left-most label
/// - IDNA labels (`xn--`) are never wildcard-matched
/// - comparison is ASCII case-insensitive
fn dns_name_matches(pattern: &str, hostname: &str) -> Result<bool> {
    if pattern.is_empty() {
        return Ok(false);
    }

    let pattern = pattern.to_ascii_lowercase();
    let hostname = hostname.to_ascii_lowercase();

    let mut pattern_labels = pattern.split('.');
    let leftmost = pattern_labels.next().unwrap_or_default();

    let wildcards = leftmost.matches('*').count();
    if wildcards > 1 {
        return Err(TlsError::Verification(format!(
            "too many wildcards in certificate DNS name: {:?}",
            pattern
        )));
    }

    if wildcards == 0 {
        return Ok(pattern == hostname);
    }

    let mut host_labels = hostname.split('.');
    let host_leftmost = host_labels.next().unwrap_or_default();

    let leftmost_ok = if leftmost == "*" {
        !host_leftmost.is_empty()
    } else if leftmost.starts_with("xn--") || host_leftmost.starts_with("xn--") {
        leftmost == host_leftmost
    } else {
        match leftmost.split_once('*') {
            Some((prefix, suffix)) => {
                host_leftmost.len() >= prefix.len() + suffix.len()
                    && host_leftmost.starts_with(prefix)
                    && host_leftmost.ends_with(suffix)
            }
            None => false,
        }
    };

    Ok(leftmost_ok && pattern_labels.eq(host_labels))
}
