// src/core/scanner/mod.rs

// Network-facing stages of the pipeline. Each stage sits behind a trait so
// the orchestrator can be driven by the real scanners or by test doubles.
pub mod ct_scanner;
pub mod discovery;
pub mod dns_scanner;
pub mod exposure_probe;
pub mod fingerprint_scanner;
pub mod port_scanner;
pub mod ssl_scanner;
pub mod technology;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::models::{ConfirmedExposure, DiscoveredAsset, Fingerprint, OpenPort, Technology};
use crate::errors::DiscoveryError;

use self::discovery::DiscoveryEngine;
use self::fingerprint_scanner::HttpInspector;
use self::port_scanner::PortScanner;

/// Finds the live subassets of a root domain.
#[async_trait]
pub trait Discover: Send + Sync {
    async fn discover(&self, root: &str) -> Result<Vec<DiscoveredAsset>, DiscoveryError>;
}

/// Finds reachable TCP ports on one address. Unreachable ports are omitted.
#[async_trait]
pub trait ProbePorts: Send + Sync {
    async fn scan_ports(&self, ip: IpAddr) -> Vec<OpenPort>;
}

/// Talks to one open port: fingerprinting, then optional confirmation.
#[async_trait]
pub trait InspectService: Send + Sync {
    async fn fingerprint(&self, ip: IpAddr, port: u16) -> Option<Fingerprint>;

    async fn confirm_exposure(&self, ip: IpAddr, port: u16, tech: Technology) -> Option<ConfirmedExposure>;
}

/// The three network stages the orchestrator drives.
#[derive(Clone)]
pub struct ScanToolkit {
    pub discovery: Arc<dyn Discover>,
    pub ports: Arc<dyn ProbePorts>,
    pub inspector: Arc<dyn InspectService>,
}

impl ScanToolkit {
    /// Wires the real scanners from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            discovery: Arc::new(DiscoveryEngine::new(config.discovery.clone(), config.probe.cert_policy)?),
            ports: Arc::new(PortScanner::from_config(&config.probe)),
            inspector: Arc::new(HttpInspector::new(&config.probe)?),
        })
    }
}
