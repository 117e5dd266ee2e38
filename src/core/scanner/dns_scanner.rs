// src/core/scanner/dns_scanner.rs

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::models::DiscoveredAsset;
use crate::errors::DiscoveryError;

/// TXT record prefix an owner publishes to prove control of a domain.
pub const VERIFICATION_PREFIX: &str = "cortex-verification=";

/// Builds the Tokio-based resolver shared by every discovery source.
pub fn build_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
}

/// Joins a label onto the root; the empty label is the root itself.
pub fn qualify(label: &str, root: &str) -> String {
    if label.is_empty() { root.to_string() } else { format!("{label}.{root}") }
}

/// Resolves one host name to its A/AAAA addresses.
pub async fn resolve_host(
    resolver: &TokioAsyncResolver,
    name: &str,
) -> Result<BTreeSet<IpAddr>, DiscoveryError> {
    match resolver.lookup_ip(name).await {
        Ok(lookup) => Ok(lookup.iter().collect()),
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(BTreeSet::new()),
        Err(source) => Err(DiscoveryError::Resolver { domain: name.to_string(), source }),
    }
}

/// Resolves `(subdomain, host)` candidates with at most `concurrency`
/// lookups in flight. Hosts that do not resolve are dropped: a missing
/// record is the expected answer for most candidates.
pub async fn resolve_candidates(
    resolver: &TokioAsyncResolver,
    candidates: impl IntoIterator<Item = (String, String)>,
    concurrency: usize,
) -> Vec<DiscoveredAsset> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (subdomain, host) in candidates {
        let resolver = resolver.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            match resolve_host(&resolver, &host).await {
                Ok(ips) if !ips.is_empty() => Some(DiscoveredAsset { subdomain, ips }),
                Ok(_) => None,
                Err(e) => {
                    debug!(name = %host, error = %e, "Lookup failed, skipping candidate.");
                    None
                }
            }
        });
    }

    let mut found = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some(asset)) = joined {
            found.push(asset);
        }
    }
    found
}

/// Resolves `label.root` for every label.
pub async fn resolve_labels(
    resolver: &TokioAsyncResolver,
    root: &str,
    labels: impl IntoIterator<Item = String>,
    concurrency: usize,
) -> Vec<DiscoveredAsset> {
    let candidates = labels.into_iter().map(|label| {
        let host = qualify(&label, root);
        (label, host)
    });
    resolve_candidates(resolver, candidates, concurrency).await
}

/// Brute-forces the wordlist against `root` and resolves the bare root too.
/// The root shows up as the empty subdomain when it has an address; an apex
/// without A/AAAA records is common and only logged.
pub async fn enumerate_subdomains(
    resolver: &TokioAsyncResolver,
    root: &str,
    wordlist: &[String],
    concurrency: usize,
) -> Vec<DiscoveredAsset> {
    info!(domain = %root, candidates = wordlist.len(), "Starting active subdomain enumeration.");

    let (root_lookup, mut found) = tokio::join!(
        resolve_host(resolver, root),
        resolve_labels(resolver, root, wordlist.iter().cloned(), concurrency)
    );

    match root_lookup {
        Ok(ips) if !ips.is_empty() => found.push(DiscoveredAsset { subdomain: String::new(), ips }),
        Ok(_) => debug!(domain = %root, "Root domain has no address records."),
        Err(e) => warn!(domain = %root, error = %e, "Root domain lookup failed."),
    }

    info!(found = found.len(), "Active enumeration finished.");
    found
}

/// Checks whether `domain` publishes `cortex-verification=<token>` in TXT.
pub async fn verify_domain(
    resolver: &TokioAsyncResolver,
    domain: &str,
    token: &str,
) -> Result<bool, DiscoveryError> {
    debug!(domain, "Looking up verification TXT records.");
    match resolver.txt_lookup(domain).await {
        Ok(records) => {
            let values: Vec<String> = records
                .iter()
                .map(|txt| txt.txt_data().iter().map(|part| String::from_utf8_lossy(part)).collect())
                .collect();
            Ok(txt_matches(&values, token))
        }
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
            debug!(domain, "No TXT records published.");
            Ok(false)
        }
        Err(source) => {
            warn!(domain, error = %source, "TXT lookup failed.");
            Err(DiscoveryError::Resolver { domain: domain.to_string(), source })
        }
    }
}

fn txt_matches(values: &[String], token: &str) -> bool {
    let expected = format!("{VERIFICATION_PREFIX}{token}");
    values.iter().any(|v| v.trim() == expected)
}
