// src/core/scanner/fingerprint_scanner.rs

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SERVER};
use tracing::{debug, info};

use super::{exposure_probe, InspectService};
use crate::config::{CertPolicy, ProbeConfig};
use crate::core::models::{ConfirmedExposure, Fingerprint, Technology};

/// HTTP side of service inspection: one bounded GET to fingerprint a port,
/// plus the narrow confirmation probes for container technologies.
pub struct HttpInspector {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    tls_ports: Vec<u16>,
    body_limit: usize,
}

impl HttpInspector {
    /// Builds the fingerprint client, whose certificate handling follows
    /// `config.cert_policy`, and the confirmation client, which never
    /// validates: kubelets and daemons serve self-signed certificates.
    /// Neither follows redirects.
    pub fn new(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = http_client(config, config.cert_policy)?;
        let probe_client = http_client(config, CertPolicy::AcceptInvalid)?;
        Ok(Self { client, probe_client, tls_ports: config.tls_ports.clone(), body_limit: config.body_limit })
    }

    pub fn scheme_for(&self, port: u16) -> &'static str {
        if self.tls_ports.contains(&port) { "https" } else { "http" }
    }

    /// `scheme://ip:port{path}`, bracketing IPv6 addresses.
    pub fn url_for(&self, ip: IpAddr, port: u16, path: &str) -> String {
        format!("{}://{}{}", self.scheme_for(port), SocketAddr::new(ip, port), path)
    }
}

#[async_trait]
impl InspectService for HttpInspector {
    async fn fingerprint(&self, ip: IpAddr, port: u16) -> Option<Fingerprint> {
        let url = self.url_for(ip, port, "/");
        debug!(%url, "Fingerprinting service.");

        let mut response = match self.client.get(&url).send().await {
            Ok(res) => res,
            Err(e) => {
                debug!(%url, error = %e, "Fingerprint request failed.");
                return None;
            }
        };

        let status_code = response.status().as_u16();
        let headers = response.headers().clone();

        let mut body: Vec<u8> = Vec::with_capacity(self.body_limit);
        while body.len() < self.body_limit {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(self.body_limit - body.len());
                    body.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(%url, error = %e, "Fingerprint body read failed.");
                    return None;
                }
            }
        }

        let fingerprint = Fingerprint {
            server: header_value(&headers, SERVER.as_str()),
            powered_by: header_value(&headers, "x-powered-by"),
            body_snippet: String::from_utf8_lossy(&body).into_owned(),
            status_code,
        };
        info!(%ip, port, status = status_code, server = %fingerprint.server, "Service fingerprinted.");
        Some(fingerprint)
    }

    async fn confirm_exposure(&self, ip: IpAddr, port: u16, tech: Technology) -> Option<ConfirmedExposure> {
        match tech {
            Technology::Kubernetes => {
                let url = format!("https://{}/pods", SocketAddr::new(ip, port));
                exposure_probe::probe_kubelet(&self.probe_client, &url).await
            }
            Technology::Docker => {
                let url = self.url_for(ip, port, "/v1.24/version");
                exposure_probe::probe_docker(&self.probe_client, &url).await
            }
            Technology::Registry | Technology::Unknown => None,
        }
    }
}

fn http_client(config: &ProbeConfig, policy: CertPolicy) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent("SurfaceRS/0.1")
        .timeout(config.http_timeout())
        .danger_accept_invalid_certs(policy.accepts_invalid())
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| v.to_str().unwrap_or("[Invalid UTF-8]").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_ports_use_https() {
        let inspector = HttpInspector::new(&ProbeConfig::default()).unwrap();
        assert_eq!(inspector.scheme_for(443), "https");
        assert_eq!(inspector.scheme_for(6443), "https");
        assert_eq!(inspector.scheme_for(2375), "http");
        assert_eq!(
            inspector.url_for("10.0.0.5".parse().unwrap(), 2375, "/v1.24/version"),
            "http://10.0.0.5:2375/v1.24/version"
        );
        assert_eq!(inspector.url_for("::1".parse().unwrap(), 8080, "/"), "http://[::1]:8080/");
    }
}
