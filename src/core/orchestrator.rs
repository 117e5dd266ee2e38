// src/core/orchestrator.rs

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerting::{AlertSink, AttackPathSink};
use crate::config::DeltaKeyStrategy;
use crate::core::models::{DiscoveredAsset, Exposure, OpenPort, ScanOutcome, Severity};
use crate::core::risk;
use crate::core::scanner::technology;
use crate::core::scanner::ScanToolkit;
use crate::errors::ScanError;
use crate::storage::{
    AuditEntry, AuditEvent, FindingRecord, NewAsset, NewFinding, NewService, Repository, ScanRunStatus,
};

/// Identity used to decide whether a finding was already known before a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeltaKey {
    TypeSeverity(String, Severity),
    AssetPortType(Option<IpAddr>, u16, String),
}

impl DeltaKey {
    pub fn of_exposure(strategy: DeltaKeyStrategy, exposure: &Exposure) -> Self {
        match strategy {
            DeltaKeyStrategy::TypeSeverity => DeltaKey::TypeSeverity(exposure.kind.clone(), exposure.severity),
            DeltaKeyStrategy::AssetPortType => {
                DeltaKey::AssetPortType(exposure.asset_ip, exposure.port, exposure.kind.clone())
            }
        }
    }

    pub fn of_record(strategy: DeltaKeyStrategy, record: &FindingRecord) -> Self {
        match strategy {
            DeltaKeyStrategy::TypeSeverity => {
                DeltaKey::TypeSeverity(record.finding.kind.clone(), record.finding.severity)
            }
            DeltaKeyStrategy::AssetPortType => {
                DeltaKey::AssetPortType(Some(record.ip_address), record.port, record.finding.kind.clone())
            }
        }
    }
}

/// Start of the UTC calendar day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now)
}

/// Runs complete scans of registered domains and records their results.
pub struct Orchestrator {
    repo: Arc<dyn Repository>,
    toolkit: ScanToolkit,
    alerts: Arc<dyn AlertSink>,
    paths: Arc<dyn AttackPathSink>,
    delta_key: DeltaKeyStrategy,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        toolkit: ScanToolkit,
        alerts: Arc<dyn AlertSink>,
        paths: Arc<dyn AttackPathSink>,
    ) -> Self {
        Self { repo, toolkit, alerts, paths, delta_key: DeltaKeyStrategy::default() }
    }

    pub fn with_delta_key(mut self, strategy: DeltaKeyStrategy) -> Self {
        self.delta_key = strategy;
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Scans one domain end to end.
    ///
    /// # Arguments
    /// * `domain` - The root domain to scan.
    /// * `domain_id` - Identifier of the stored domain record.
    ///
    /// # Returns
    /// The discovered assets with every non-informational finding, and the
    /// subset not seen before this scan. Fails when the domain is unknown,
    /// the organization is over its daily quota, or discovery finds nothing.
    pub async fn run_scan(&self, domain: &str, domain_id: Uuid) -> Result<ScanOutcome, ScanError> {
        let record = self.repo.domain_by_id(domain_id).await?.ok_or(ScanError::DomainNotFound(domain_id))?;
        let org = self
            .repo
            .organization(record.org_id)
            .await?
            .ok_or(ScanError::OrganizationNotFound(record.org_id))?;

        let used = self.repo.count_scan_runs_since(org.id, start_of_day(Utc::now())).await?;
        if used >= org.daily_scan_limit {
            warn!(%domain, org = %org.name, used, limit = org.daily_scan_limit, "Daily scan quota reached.");
            return Err(ScanError::QuotaExceeded { org_id: org.id, used, limit: org.daily_scan_limit });
        }

        let known: HashSet<DeltaKey> = self
            .repo
            .latest_findings_for_domain(domain_id)
            .await?
            .iter()
            .map(|r| DeltaKey::of_record(self.delta_key, r))
            .collect();

        let run = self.repo.create_scan_run(domain_id).await?;
        info!(%domain, run_id = %run.id, "Starting scan");
        self.audit(org.id, AuditEvent::ScanStart { domain: domain.to_string() }).await;

        let assets = match self.toolkit.discovery.discover(domain).await {
            Ok(assets) => assets,
            Err(e) => {
                error!(%domain, error = %e, "Discovery failed, aborting scan.");
                self.finish(run.id, ScanRunStatus::Failed).await;
                self.audit(org.id, AuditEvent::ScanFailed { domain: domain.to_string(), reason: e.to_string() })
                    .await;
                return Err(e.into());
            }
        };
        info!(%domain, assets = assets.len(), "Discovery finished.");

        let mut outcome = ScanOutcome { assets, ..Default::default() };
        for asset in &outcome.assets {
            let findings = self.scan_asset(domain_id, asset).await;
            for exposure in findings {
                if !known.contains(&DeltaKey::of_exposure(self.delta_key, &exposure)) {
                    outcome.new_findings.push(exposure.clone());
                }
                outcome.all_findings.push(exposure);
            }
        }

        if outcome.all_findings.len() > 1 {
            let paths = risk::analyze_attack_paths(&outcome.all_findings);
            if !paths.is_empty() {
                self.paths.record(domain, &paths);
            }
        }

        self.finish(run.id, ScanRunStatus::Completed).await;
        self.audit(
            org.id,
            AuditEvent::ScanComplete {
                domain: domain.to_string(),
                findings: outcome.all_findings.len(),
                new_findings: outcome.new_findings.len(),
            },
        )
        .await;
        info!(
            %domain,
            findings = outcome.all_findings.len(),
            new_findings = outcome.new_findings.len(),
            "Scan completed"
        );

        if !outcome.new_findings.is_empty() {
            if let Err(e) = self.alerts.send_alert(domain, &outcome.new_findings).await {
                error!(%domain, error = %e, "Alert delivery failed.");
            }
        }

        Ok(outcome)
    }

    /// Probes the primary address of one asset and returns its findings.
    async fn scan_asset(&self, domain_id: Uuid, asset: &DiscoveredAsset) -> Vec<Exposure> {
        let Some(ip) = asset.primary_ip() else {
            debug!(subdomain = %asset.subdomain, "Asset has no address, skipping.");
            return Vec::new();
        };

        let asset_id = match self
            .repo
            .save_asset(NewAsset { domain_id, subdomain: asset.subdomain.clone(), ip_address: ip })
            .await
        {
            Ok(saved) => Some(saved.id),
            Err(e) => {
                error!(subdomain = %asset.subdomain, %ip, error = %e, "Failed to save asset.");
                None
            }
        };

        let open_ports = self.toolkit.ports.scan_ports(ip).await;
        debug!(subdomain = %asset.subdomain, %ip, open = open_ports.len(), "Port scan finished.");

        let mut findings = Vec::new();
        for open in open_ports {
            if let Some(exposure) = self.scan_port(asset_id, ip, open).await {
                findings.push(exposure);
            }
        }
        findings
    }

    /// Fingerprints, classifies and persists one open port. Returns the
    /// exposure unless it is informational.
    async fn scan_port(&self, asset_id: Option<Uuid>, ip: IpAddr, open: OpenPort) -> Option<Exposure> {
        let fingerprint = self
            .toolkit
            .inspector
            .fingerprint(ip, open.port)
            .await
            .map(|f| f.as_text())
            .unwrap_or_default();
        let tech = technology::classify(open.port, &fingerprint);

        let basic = risk::classify(open.port, tech, &fingerprint);
        let confirmed = self.toolkit.inspector.confirm_exposure(ip, open.port, tech).await;
        let mut exposure = risk::apply_confirmation(basic, confirmed);
        exposure.asset_ip = Some(ip);

        let service_id = match asset_id {
            Some(asset_id) => match self
                .repo
                .save_service(NewService {
                    asset_id,
                    port: open.port,
                    protocol: open.protocol,
                    fingerprint,
                    technology: tech,
                })
                .await
            {
                Ok(service) => Some(service.id),
                Err(e) => {
                    error!(%ip, port = open.port, error = %e, "Failed to save service.");
                    None
                }
            },
            None => None,
        };

        if exposure.severity == Severity::Info {
            return None;
        }

        if let Some(service_id) = service_id {
            let saved = self
                .repo
                .save_finding(NewFinding {
                    service_id,
                    kind: exposure.kind.clone(),
                    severity: exposure.severity,
                    description: exposure.description.clone(),
                    remediation: exposure.remediation.clone(),
                })
                .await;
            if let Err(e) = saved {
                error!(%ip, port = open.port, error = %e, "Failed to save finding.");
            }
        }

        info!(%ip, port = open.port, technology = %tech, finding = %exposure.kind, severity = %exposure.severity, "Exposure found.");
        Some(exposure)
    }

    async fn finish(&self, run_id: Uuid, status: ScanRunStatus) {
        if let Err(e) = self.repo.finish_scan_run(run_id, status).await {
            error!(%run_id, %status, error = %e, "Failed to finalize scan run.");
        }
    }

    async fn audit(&self, org_id: Uuid, event: AuditEvent) {
        if let Err(e) = self.repo.record_audit(AuditEntry::new(Some(org_id), event)).await {
            error!(error = %e, "Failed to write audit entry.");
        }
    }
}
