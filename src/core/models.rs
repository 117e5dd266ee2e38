// src/core/models.rs

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// --- Severity & Technology ---

/// Severity of an exposure, ordered from most to least urgent.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Weight contributed by one step of an attack path.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 40,
            Severity::High => 25,
            Severity::Medium => 15,
            Severity::Low => 5,
            Severity::Info => 0,
        }
    }

    /// Maps a 0-100 attack path score back onto a severity band.
    pub fn from_score(score: u32) -> Self {
        match score {
            70.. => Severity::Critical,
            50..=69 => Severity::High,
            30..=49 => Severity::Medium,
            10..=29 => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// Only critical and high findings are worth paging someone for.
    pub fn is_alertable(self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

/// Closed set of technologies the classifier knows how to recognise.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Technology {
    Docker,
    Kubernetes,
    Registry,
    Unknown,
}

// --- Discovery ---

/// A subdomain of the scanned root together with every address it resolved to.
/// An empty `subdomain` stands for the root domain itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DiscoveredAsset {
    pub subdomain: String,
    pub ips: BTreeSet<IpAddr>,
}

impl DiscoveredAsset {
    pub fn new(subdomain: impl Into<String>, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self { subdomain: subdomain.into(), ips: ips.into_iter().collect() }
    }

    /// The address that gets port-scanned and persisted for this asset.
    pub fn primary_ip(&self) -> Option<IpAddr> {
        self.ips.iter().next().copied()
    }
}

// --- Probing ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: Protocol,
}

impl OpenPort {
    pub fn tcp(port: u16) -> Self {
        Self { port, protocol: Protocol::Tcp }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

/// Identifying metadata pulled out of a single HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub server: String,
    pub powered_by: String,
    pub body_snippet: String,
    pub status_code: u16,
}

impl Fingerprint {
    /// The text the technology classifier matches against and the value
    /// persisted on the service record.
    pub fn as_text(&self) -> String {
        format!("{} {}", self.server, self.body_snippet)
    }
}

/// Result of an active confirmation probe that proved unauthenticated access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedExposure {
    /// Knowledge base code of the confirmed finding.
    pub code: &'static str,
    pub severity: Severity,
}

// --- Risk ---

/// A security-relevant observation about one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub remediation: String,
    pub asset_ip: Option<IpAddr>,
    pub port: u16,
    pub technology: Technology,
}

/// A chain of exposures judged more dangerous together than apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttackPath {
    pub id: String,
    pub steps: Vec<Exposure>,
    pub combined_risk: Severity,
    pub description: String,
    pub score: u32,
}

// --- Scan Result ---

/// What a successful orchestrator run hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub assets: Vec<DiscoveredAsset>,
    pub all_findings: Vec<Exposure>,
    pub new_findings: Vec<Exposure>,
}
