// src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

pub const CONFIG_ENV: &str = "SURFACE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "surface.json";

/// How reconnaissance connections treat the peer's certificate chain.
///
/// Recon only reads public certificate metadata and probes for exposure, so
/// accepting invalid chains is a deliberate capability. It is never implied:
/// every component that opens TLS is handed one of these explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CertPolicy {
    Verify,
    AcceptInvalid,
}

impl CertPolicy {
    pub fn accepts_invalid(self) -> bool {
        matches!(self, CertPolicy::AcceptInvalid)
    }
}

/// Which identity is used to decide whether a finding is new.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKeyStrategy {
    /// Finding type + severity. Coarse: the same issue on two hosts collapses to one key.
    #[default]
    TypeSeverity,
    /// Asset address + port + finding type.
    AssetPortType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub wordlist: Vec<String>,
    /// Base URL of the crt.sh compatible certificate transparency search.
    pub ct_log_url: String,
    pub ct_timeout_secs: u64,
    pub tls_timeout_secs: u64,
    pub active_concurrency: usize,
    pub passive_concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            wordlist: [
                "www", "api", "dev", "staging", "prod", "test", "db", "database", "admin",
                "dashboard", "portal", "git", "gitlab", "jenkins", "docker", "k8s", "kube",
                "registry", "vault", "vpn", "mail", "remote",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ct_log_url: "https://crt.sh/".to_string(),
            ct_timeout_secs: 15,
            tls_timeout_secs: 5,
            active_concurrency: 10,
            passive_concurrency: 5,
        }
    }
}

impl DiscoveryConfig {
    pub fn ct_timeout(&self) -> Duration {
        Duration::from_secs(self.ct_timeout_secs)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub ports: Vec<u16>,
    /// Ports spoken to over HTTPS by the fingerprinter and the confirmation probes.
    pub tls_ports: Vec<u16>,
    pub connect_timeout_ms: u64,
    pub concurrency: usize,
    pub http_timeout_secs: u64,
    pub body_limit: usize,
    pub cert_policy: CertPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ports: vec![
                80, 443, // web
                2375, 2376, // docker
                6443, 8443, // kubernetes api
                10250, 10255, // kubelet
                5000, // registry
                3000, 8080, 9000, 9090, // dashboards
            ],
            tls_ports: vec![443, 2376, 6443, 8443, 10250],
            connect_timeout_ms: 2000,
            concurrency: 20,
            http_timeout_secs: 5,
            body_limit: 1024,
            cert_policy: CertPolicy::AcceptInvalid,
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_concurrent_scans: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 24 * 60 * 60, max_concurrent_scans: 4 }
    }
}

impl SchedulerConfig {
    /// Never zero: `tokio::time::interval` rejects a zero period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub finished_ttl_secs: u64,
    pub max_finished: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { finished_ttl_secs: 6 * 60 * 60, max_finished: 1000 }
    }
}

impl QueueConfig {
    pub fn finished_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self { webhook_url: None, timeout_secs: 10 }
    }
}

/// Organizations and domains loaded into the in-memory store at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeedConfig {
    pub organizations: Vec<SeedOrganization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOrganization {
    pub name: String,
    pub daily_scan_limit: u32,
    #[serde(default)]
    pub domains: Vec<SeedDomain>,
}

impl SeedConfig {
    /// Flags `domain` as verified. Returns false when it is not listed.
    pub fn mark_verified(&mut self, domain: &str) -> bool {
        let found = self
            .organizations
            .iter_mut()
            .flat_map(|org| org.domains.iter_mut())
            .find(|d| d.name.eq_ignore_ascii_case(domain));
        match found {
            Some(d) => {
                d.verified = true;
                true
            }
            None => false,
        }
    }

    pub fn verification_token(&self, domain: &str) -> Option<&str> {
        self.organizations
            .iter()
            .flat_map(|org| org.domains.iter())
            .find(|d| d.name.eq_ignore_ascii_case(domain))
            .and_then(|d| d.verification_token.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDomain {
    pub name: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub probe: ProbeConfig,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub alerting: AlertingConfig,
    pub delta_key: DeltaKeyStrategy,
    pub seed: SeedConfig,
}

impl AppConfig {
    /// The path given, else `SURFACE_CONFIG`, else `surface.json` in the
    /// working directory.
    pub fn resolve_path(path: Option<&Path>) -> PathBuf {
        match path {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        }
    }

    /// Loads the JSON config file (if present) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = Self::read_file(&Self::resolve_path(path))?;
        cfg.apply_env(|key| env::var(key).ok())?;
        info!(cert_policy = ?cfg.probe.cert_policy, "Configuration ready.");
        Ok(cfg)
    }

    /// Reads the file alone, without environment overrides. A missing file
    /// yields the defaults.
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                info!(path = %path.display(), "Loaded configuration file.");
                Self::from_json(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults.");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read { path: path.to_path_buf(), source }),
        }
    }

    /// Writes the configuration back as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        fs::write(path, raw).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
        info!(path = %path.display(), "Configuration file written.");
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Applies `SURFACE_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SURFACE_SCHEDULE_INTERVAL_SECS") {
            self.scheduler.interval_secs = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "SURFACE_SCHEDULE_INTERVAL_SECS", value: v })?;
        }
        if let Some(v) = lookup("SURFACE_WEBHOOK_URL") {
            self.alerting.webhook_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("SURFACE_ACCEPT_INVALID_CERTS") {
            let accept: bool = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "SURFACE_ACCEPT_INVALID_CERTS", value: v })?;
            self.probe.cert_policy = if accept { CertPolicy::AcceptInvalid } else { CertPolicy::Verify };
        }
        Ok(())
    }
}
