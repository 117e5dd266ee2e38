// src/core/scanner/discovery.rs

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, warn};

use super::{ct_scanner, dns_scanner, ssl_scanner, Discover};
use crate::config::{CertPolicy, DiscoveryConfig};
use crate::core::models::DiscoveredAsset;
use crate::errors::DiscoveryError;

/// Combines dictionary brute force, certificate transparency and the
/// root's own TLS certificate into one deduplicated asset list.
pub struct DiscoveryEngine {
    resolver: TokioAsyncResolver,
    http: reqwest::Client,
    config: DiscoveryConfig,
    cert_policy: CertPolicy,
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig, cert_policy: CertPolicy) -> Result<Self, reqwest::Error> {
        Self::with_resolver(config, cert_policy, dns_scanner::build_resolver())
    }

    /// Same as `new`, with every lookup sent through `resolver`.
    pub fn with_resolver(
        config: DiscoveryConfig,
        cert_policy: CertPolicy,
        resolver: TokioAsyncResolver,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent("SurfaceRS/0.1")
            .timeout(config.ct_timeout())
            .build()?;
        Ok(Self { resolver, http, config, cert_policy })
    }

    /// `(subdomain, host)` candidates named by CT logs and by the root
    /// certificate. Both sources are optional: a failure is logged and
    /// contributes nothing.
    async fn passive_candidates(&self, root: &str) -> BTreeMap<String, String> {
        let (ct, sans) = tokio::join!(
            ct_scanner::query_ct_log(&self.http, &self.config.ct_log_url, root),
            self.certificate_sans(root)
        );

        let mut candidates = BTreeMap::new();
        match ct {
            Ok(labels) => {
                for label in labels {
                    let host = dns_scanner::qualify(&label, root);
                    candidates.insert(label, host);
                }
            }
            Err(e) => warn!(domain = %root, error = %e, "Passive CT discovery unavailable."),
        }
        candidates.extend(ssl_scanner::san_candidates(&sans, root));
        candidates
    }

    /// SANs of the certificate served on the first reachable root address.
    async fn certificate_sans(&self, root: &str) -> Vec<String> {
        let addrs: Vec<SocketAddr> = match dns_scanner::resolve_host(&self.resolver, root).await {
            Ok(ips) => ips.into_iter().map(|ip| SocketAddr::new(ip, ssl_scanner::TLS_PORT)).collect(),
            Err(e) => {
                debug!(domain = %root, error = %e, "Root lookup failed, skipping certificate SANs.");
                return Vec::new();
            }
        };
        if addrs.is_empty() {
            debug!(domain = %root, "Root has no address, skipping certificate SANs.");
            return Vec::new();
        }
        match ssl_scanner::extract_sans(root, addrs, self.config.tls_timeout(), self.cert_policy).await {
            Ok(sans) => sans,
            Err(e) => {
                debug!(domain = %root, error = %e, "No SANs collected.");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Discover for DiscoveryEngine {
    /// Fails with `RootUnresolvable` only when neither the root nor any
    /// active or passive candidate resolves.
    async fn discover(&self, root: &str) -> Result<Vec<DiscoveredAsset>, DiscoveryError> {
        info!(domain = %root, "Starting asset discovery.");

        let (active, passive_candidates) = tokio::join!(
            dns_scanner::enumerate_subdomains(
                &self.resolver,
                root,
                &self.config.wordlist,
                self.config.active_concurrency
            ),
            self.passive_candidates(root)
        );

        let passive = dns_scanner::resolve_candidates(
            &self.resolver,
            passive_candidates,
            self.config.passive_concurrency,
        )
        .await;

        let assets = merge_assets(active, passive);
        if assets.is_empty() {
            warn!(domain = %root, "Nothing under the root domain resolved.");
            return Err(DiscoveryError::RootUnresolvable { domain: root.to_string() });
        }
        info!(assets = assets.len(), "Asset discovery finished.");
        Ok(assets)
    }
}

/// Merges active and passive results keyed by subdomain, unioning the IP
/// sets of entries that share a label. Output is ordered by subdomain.
pub fn merge_assets(
    active: impl IntoIterator<Item = DiscoveredAsset>,
    passive: impl IntoIterator<Item = DiscoveredAsset>,
) -> Vec<DiscoveredAsset> {
    let mut by_subdomain: BTreeMap<String, BTreeSet<_>> = BTreeMap::new();
    for asset in active.into_iter().chain(passive) {
        by_subdomain.entry(asset.subdomain).or_default().extend(asset.ips);
    }
    by_subdomain
        .into_iter()
        .map(|(subdomain, ips)| DiscoveredAsset { subdomain, ips })
        .collect()
}
