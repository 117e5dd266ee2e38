// tests/common/mod.rs

#![allow(dead_code)]

pub mod dns;
pub mod tls;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use surface_rs_scanner::alerting::{AlertSink, AttackPathSink};
use surface_rs_scanner::core::models::{
    AttackPath, ConfirmedExposure, DiscoveredAsset, Exposure, Fingerprint, OpenPort, Technology,
};
use surface_rs_scanner::core::orchestrator::Orchestrator;
use surface_rs_scanner::core::scanner::{Discover, InspectService, ProbePorts, ScanToolkit};
use surface_rs_scanner::errors::{AlertError, DiscoveryError};
use surface_rs_scanner::storage::MemoryRepository;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Returns a fixed asset list, or fails as if the root did not resolve.
#[derive(Default)]
pub struct FakeDiscovery {
    assets: Mutex<Option<Vec<DiscoveredAsset>>>,
}

impl FakeDiscovery {
    pub fn with(assets: Vec<DiscoveredAsset>) -> Self {
        Self { assets: Mutex::new(Some(assets)) }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn set(&self, assets: Vec<DiscoveredAsset>) {
        *self.assets.lock().unwrap() = Some(assets);
    }
}

#[async_trait]
impl Discover for FakeDiscovery {
    async fn discover(&self, root: &str) -> Result<Vec<DiscoveredAsset>, DiscoveryError> {
        self.assets
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DiscoveryError::RootUnresolvable { domain: root.to_string() })
    }
}

#[derive(Default)]
pub struct FakePorts {
    open: HashMap<IpAddr, Vec<u16>>,
}

impl FakePorts {
    pub fn open(mut self, addr: &str, ports: &[u16]) -> Self {
        self.open.insert(ip(addr), ports.to_vec());
        self
    }
}

#[async_trait]
impl ProbePorts for FakePorts {
    async fn scan_ports(&self, ip: IpAddr) -> Vec<OpenPort> {
        self.open.get(&ip).map(|ports| ports.iter().map(|p| OpenPort::tcp(*p)).collect()).unwrap_or_default()
    }
}

#[derive(Default)]
pub struct FakeInspector {
    bodies: HashMap<(IpAddr, u16), String>,
    confirmations: HashMap<(IpAddr, u16), ConfirmedExposure>,
}

impl FakeInspector {
    pub fn body(mut self, addr: &str, port: u16, body: &str) -> Self {
        self.bodies.insert((ip(addr), port), body.to_string());
        self
    }

    pub fn confirm(mut self, addr: &str, port: u16, confirmed: ConfirmedExposure) -> Self {
        self.confirmations.insert((ip(addr), port), confirmed);
        self
    }
}

#[async_trait]
impl InspectService for FakeInspector {
    async fn fingerprint(&self, ip: IpAddr, port: u16) -> Option<Fingerprint> {
        self.bodies.get(&(ip, port)).map(|body| Fingerprint {
            body_snippet: body.clone(),
            status_code: 200,
            ..Default::default()
        })
    }

    async fn confirm_exposure(&self, ip: IpAddr, port: u16, _tech: Technology) -> Option<ConfirmedExposure> {
        self.confirmations.get(&(ip, port)).cloned()
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    pub sent: Mutex<Vec<(String, Vec<Exposure>)>>,
    pub fail: bool,
}

impl RecordingAlerts {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn send_alert(&self, domain: &str, exposures: &[Exposure]) -> Result<(), AlertError> {
        self.sent.lock().unwrap().push((domain.to_string(), exposures.to_vec()));
        if self.fail {
            return Err(AlertError::WebhookStatus { url: "http://hooks.invalid".into(), status: 503 });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPaths {
    pub paths: Mutex<Vec<AttackPath>>,
}

impl AttackPathSink for RecordingPaths {
    fn record(&self, _domain: &str, paths: &[AttackPath]) {
        self.paths.lock().unwrap().extend_from_slice(paths);
    }
}

pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub discovery: Arc<FakeDiscovery>,
    pub alerts: Arc<RecordingAlerts>,
    pub paths: Arc<RecordingPaths>,
    pub orchestrator: Orchestrator,
}

pub fn harness(
    repo: Arc<MemoryRepository>,
    discovery: FakeDiscovery,
    ports: FakePorts,
    inspector: FakeInspector,
    alerts: RecordingAlerts,
) -> Harness {
    let discovery = Arc::new(discovery);
    let alerts = Arc::new(alerts);
    let paths = Arc::new(RecordingPaths::default());
    let toolkit = ScanToolkit {
        discovery: discovery.clone(),
        ports: Arc::new(ports),
        inspector: Arc::new(inspector),
    };
    let orchestrator = Orchestrator::new(repo.clone(), toolkit, alerts.clone(), paths.clone());
    Harness { repo, discovery, alerts, paths, orchestrator }
}

/// One organization owning one verified domain.
pub async fn seeded(root: &str, daily_limit: u32) -> (Arc<MemoryRepository>, uuid::Uuid) {
    let repo = Arc::new(MemoryRepository::new());
    let org = repo.insert_organization("acme", daily_limit).await;
    let domain = repo.insert_domain(org, root, true, "token").await;
    (repo, domain)
}
