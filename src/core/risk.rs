// src/core/risk.rs

use std::collections::BTreeMap;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::knowledge_base::{self, EXPOSED_KUBERNETES_API, EXPOSED_SERVICE, INSECURE_DOCKER_API};
use crate::core::models::{AttackPath, ConfirmedExposure, Exposure, Severity, Technology};

static RE_KUBERNETES: Lazy<Regex> = Lazy::new(|| Regex::new(r"Kubernetes|Kubelet|K8s").unwrap());
static RE_DATABASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Database|PostgreSQL|MySQL|MongoDB|Redis").unwrap());
static RE_DOCKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Docker").unwrap());

const MULTI_STEP_BONUS: u32 = 10;
const MAX_SCORE: u32 = 100;

/// Builds an exposure from a knowledge base entry, without asset context.
pub fn exposure_from_code(code: &str, port: u16, technology: Technology) -> Exposure {
    let detail = knowledge_base::detail(code);
    Exposure {
        kind: detail.title.to_string(),
        severity: detail.severity,
        description: detail.description.to_string(),
        remediation: detail.remediation.to_string(),
        asset_ip: None,
        port,
        technology,
    }
}

/// Rates a classified service.
///
/// A cleartext Docker API is critical, anything Kubernetes is high, and
/// everything else is an informational "Exposed Service".
pub fn classify(port: u16, technology: Technology, _fingerprint: &str) -> Exposure {
    let code = match technology {
        Technology::Docker if port == 2375 => INSECURE_DOCKER_API,
        Technology::Kubernetes => EXPOSED_KUBERNETES_API,
        _ => EXPOSED_SERVICE,
    };
    exposure_from_code(code, port, technology)
}

/// Replaces a basic classification with a probe-confirmed finding.
/// Type, severity, description and remediation come from the confirmed
/// finding; address, port and technology are kept.
pub fn apply_confirmation(basic: Exposure, confirmed: Option<ConfirmedExposure>) -> Exposure {
    let Some(confirmed) = confirmed else {
        return basic;
    };
    let detail = knowledge_base::detail(confirmed.code);
    Exposure {
        kind: detail.title.to_string(),
        severity: confirmed.severity,
        description: detail.description.to_string(),
        remediation: detail.remediation.to_string(),
        ..basic
    }
}

/// Sums step weights, adds the multi-step bonus and caps the result.
pub fn path_score(steps: &[Exposure]) -> u32 {
    let base: u32 = steps.iter().map(|s| s.severity.weight()).sum();
    let bonus = if steps.len() >= 2 { MULTI_STEP_BONUS } else { 0 };
    (base + bonus).min(MAX_SCORE)
}

fn build_path(id: String, steps: Vec<Exposure>, description: &str) -> AttackPath {
    let score = path_score(&steps);
    AttackPath {
        id,
        steps,
        combined_risk: Severity::from_score(score),
        description: description.to_string(),
        score,
    }
}

fn is_kubernetes(e: &Exposure) -> bool {
    e.technology == Technology::Kubernetes || RE_KUBERNETES.is_match(&e.kind)
}

fn is_docker(e: &Exposure) -> bool {
    e.technology == Technology::Docker || RE_DOCKER.is_match(&e.kind)
}

fn is_database(e: &Exposure) -> bool {
    RE_DATABASE.is_match(&e.kind)
}

/// Chains co-occurring findings into composite attack paths.
///
/// Every heuristic is evaluated independently:
/// 1. a Kubernetes exposure plus a database exposure anywhere, `k8s-db-chain`;
/// 2. a Docker exposure plus a database exposure anywhere, `docker-db-chain`;
/// 3. per address, two or more critical findings, `multi-critical-{ip}`.
///
/// Fewer than two findings never produce a path.
pub fn analyze_attack_paths(findings: &[Exposure]) -> Vec<AttackPath> {
    let mut paths = Vec::new();
    if findings.len() < 2 {
        return paths;
    }

    let database = findings.iter().find(|e| is_database(e));

    if let (Some(k8s), Some(db)) = (findings.iter().find(|e| is_kubernetes(e)), database) {
        paths.push(build_path(
            "k8s-db-chain".to_string(),
            vec![k8s.clone(), db.clone()],
            "Kubernetes API exposure combined with database access could allow cluster compromise and data exfiltration",
        ));
    }

    if let (Some(docker), Some(db)) = (findings.iter().find(|e| is_docker(e)), database) {
        paths.push(build_path(
            "docker-db-chain".to_string(),
            vec![docker.clone(), db.clone()],
            "Docker API exposure combined with database access could allow container escape and data breach",
        ));
    }

    let mut by_asset: BTreeMap<IpAddr, Vec<Exposure>> = BTreeMap::new();
    for finding in findings {
        if let Some(ip) = finding.asset_ip {
            by_asset.entry(ip).or_default().push(finding.clone());
        }
    }
    for (ip, steps) in by_asset {
        let criticals = steps.iter().filter(|s| s.severity == Severity::Critical).count();
        if steps.len() >= 2 && criticals >= 2 {
            paths.push(build_path(
                format!("multi-critical-{ip}"),
                steps,
                "Multiple critical vulnerabilities on the same asset increase exploitation likelihood",
            ));
        }
    }

    debug!(findings = findings.len(), paths = paths.len(), "Attack path analysis finished.");
    paths
}
