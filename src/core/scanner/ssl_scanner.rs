// src/core/scanner/ssl_scanner.rs

use std::collections::BTreeMap;
use std::io::{Error as IoError, ErrorKind};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use native_tls::TlsConnector;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use crate::config::CertPolicy;
use crate::errors::DiscoveryError;

/// Port the root certificate is read from.
pub const TLS_PORT: u16 = 443;

/// Opens a TLS session to the first reachable address of `target` and
/// returns the DNS names listed in the leaf certificate's Subject
/// Alternative Name extension. `target` is sent as the SNI name.
///
/// The connection is used for information gathering only; with
/// `CertPolicy::AcceptInvalid` the chain and host name are not validated.
pub async fn extract_sans(
    target: &str,
    addrs: Vec<SocketAddr>,
    timeout: Duration,
    policy: CertPolicy,
) -> Result<Vec<String>, DiscoveryError> {
    info!(target, "Starting TLS certificate SAN extraction.");
    let target_owned = target.to_string();

    debug!("Spawning blocking task for TLS connection.");
    let result = spawn_blocking(move || perform_san_extraction(&target_owned, &addrs, timeout, policy))
        .await
        .unwrap_or_else(|e| {
            error!(panic = %e, "Blocking SAN extraction task panicked!");
            Err(DiscoveryError::Tls { domain: target.to_string(), reason: format!("task panicked: {e}") })
        });

    if let Ok(sans) = &result {
        info!(count = sans.len(), "SAN extraction finished.");
    }
    result
}

fn perform_san_extraction(
    target: &str,
    addrs: &[SocketAddr],
    timeout: Duration,
    policy: CertPolicy,
) -> Result<Vec<String>, DiscoveryError> {
    let fail = |reason: String| DiscoveryError::Tls { domain: target.to_string(), reason };

    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(policy.accepts_invalid())
        .danger_accept_invalid_hostnames(policy.accepts_invalid())
        .build()
        .map_err(|e| fail(format!("TlsConnector error: {e}")))?;

    debug!(target, ?addrs, "Connecting TCP stream.");
    let stream = connect_with_timeout(addrs, timeout).map_err(|e| fail(format!("TCP connection error: {e}")))?;

    debug!(target, "Performing TLS handshake.");
    let stream = connector
        .connect(target, stream)
        .map_err(|e| fail(format!("TLS handshake error: {e}")))?;

    let cert = match stream.peer_certificate() {
        Ok(Some(c)) => c,
        Ok(None) => {
            debug!("TLS connection successful, but no peer certificate provided.");
            return Ok(Vec::new());
        }
        Err(e) => return Err(fail(format!("could not get peer certificate: {e}"))),
    };

    let der = cert.to_der().map_err(|e| fail(format!("could not convert certificate to DER: {e}")))?;
    sans_from_der(&der).map_err(fail)
}

fn connect_with_timeout(addrs: &[SocketAddr], timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last_err = IoError::new(ErrorKind::NotFound, "no address resolved");
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(stream);
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Pulls the deduplicated DNS SANs out of a DER encoded certificate.
pub fn sans_from_der(der: &[u8]) -> Result<Vec<String>, String> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| format!("X.509 parse error: {e}"))?;
    debug!(subject = %x509.subject(), issuer = %x509.issuer(), "Parsed leaf certificate.");

    let mut names: Vec<String> = Vec::new();
    if let Some(san) = x509
        .subject_alternative_name()
        .map_err(|e| format!("malformed SAN extension: {e}"))?
    {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                let dns = dns.to_string();
                if !names.contains(&dns) {
                    names.push(dns);
                }
            }
        }
    }
    Ok(names)
}

/// Turns SANs into `(subdomain, host)` lookup candidates. Names under
/// `root` keep their label, any other name is kept whole as its own
/// subdomain. The root itself and wildcard entries are skipped.
pub fn san_candidates(sans: &[String], root: &str) -> Vec<(String, String)> {
    let root = root.to_ascii_lowercase();
    let suffix = format!(".{root}");
    let mut candidates = BTreeMap::new();
    for san in sans {
        let host = san.trim().trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() || host == root || host.contains('*') {
            continue;
        }
        let subdomain = host.strip_suffix(&suffix).unwrap_or(&host).to_string();
        candidates.insert(subdomain, host);
    }
    candidates.into_iter().collect()
}
