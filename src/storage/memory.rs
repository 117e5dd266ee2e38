// src/storage/memory.rs

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    Asset, AuditEntry, Domain, Finding, FindingRecord, NewAsset, NewFinding, NewService, Organization,
    Repository, ScanRun, ScanRunStatus, Service, StorageResult,
};
use crate::config::SeedConfig;
use crate::core::models::Protocol;
use crate::errors::StorageError;

#[derive(Default)]
struct Tables {
    organizations: HashMap<Uuid, Organization>,
    domains: HashMap<Uuid, Domain>,
    assets: HashMap<Uuid, Asset>,
    asset_keys: HashMap<(Uuid, String, IpAddr), Uuid>,
    services: HashMap<Uuid, Service>,
    service_keys: HashMap<(Uuid, u16, Protocol), Uuid>,
    findings: Vec<Finding>,
    scan_runs: Vec<ScanRun>,
    audit_log: Vec<AuditEntry>,
}

/// In-process `Repository` with the same uniqueness and upsert rules as the
/// relational schema. All state is lost when the process exits.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with the configured organizations and domains.
    pub async fn from_seed(seed: &SeedConfig) -> Self {
        let repo = Self::new();
        for org in &seed.organizations {
            let org_id = repo.insert_organization(&org.name, org.daily_scan_limit).await;
            for domain in &org.domains {
                let token = domain.verification_token.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
                repo.insert_domain(org_id, &domain.name, domain.verified, &token).await;
            }
        }
        info!(organizations = seed.organizations.len(), "In-memory store seeded.");
        repo
    }

    pub async fn insert_organization(&self, name: &str, daily_scan_limit: u32) -> Uuid {
        let org = Organization { id: Uuid::new_v4(), name: name.to_string(), daily_scan_limit };
        let id = org.id;
        self.tables.write().await.organizations.insert(id, org);
        id
    }

    pub async fn insert_domain(&self, org_id: Uuid, root_domain: &str, verified: bool, token: &str) -> Uuid {
        let domain = Domain {
            id: Uuid::new_v4(),
            org_id,
            root_domain: root_domain.to_string(),
            verified,
            verification_token: token.to_string(),
            created_at: Utc::now(),
        };
        let id = domain.id;
        self.tables.write().await.domains.insert(id, domain);
        id
    }

    /// Inserts a run with an explicit start time and status.
    pub async fn insert_scan_run(&self, domain_id: Uuid, started_at: DateTime<Utc>, status: ScanRunStatus) -> Uuid {
        let run = ScanRun {
            id: Uuid::new_v4(),
            domain_id,
            status,
            started_at,
            finished_at: (status != ScanRunStatus::Running).then_some(started_at),
        };
        let id = run.id;
        self.tables.write().await.scan_runs.push(run);
        id
    }

    pub async fn assets(&self) -> Vec<Asset> {
        self.tables.read().await.assets.values().cloned().collect()
    }

    pub async fn services(&self) -> Vec<Service> {
        self.tables.read().await.services.values().cloned().collect()
    }

    pub async fn findings(&self) -> Vec<Finding> {
        self.tables.read().await.findings.clone()
    }

    pub async fn scan_runs(&self) -> Vec<ScanRun> {
        self.tables.read().await.scan_runs.clone()
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit_log.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn domain_by_id(&self, id: Uuid) -> StorageResult<Option<Domain>> {
        Ok(self.tables.read().await.domains.get(&id).cloned())
    }

    async fn domain_by_name(&self, root_domain: &str) -> StorageResult<Option<Domain>> {
        let tables = self.tables.read().await;
        Ok(tables.domains.values().find(|d| d.root_domain.eq_ignore_ascii_case(root_domain)).cloned())
    }

    async fn verified_domains(&self) -> StorageResult<Vec<Domain>> {
        let tables = self.tables.read().await;
        let mut domains: Vec<Domain> = tables.domains.values().filter(|d| d.verified).cloned().collect();
        domains.sort_by(|a, b| a.root_domain.cmp(&b.root_domain));
        Ok(domains)
    }

    async fn organization(&self, id: Uuid) -> StorageResult<Option<Organization>> {
        Ok(self.tables.read().await.organizations.get(&id).cloned())
    }

    async fn count_scan_runs_since(&self, org_id: Uuid, since: DateTime<Utc>) -> StorageResult<u32> {
        let tables = self.tables.read().await;
        let count = tables
            .scan_runs
            .iter()
            .filter(|run| run.started_at >= since)
            .filter(|run| tables.domains.get(&run.domain_id).is_some_and(|d| d.org_id == org_id))
            .count();
        Ok(count as u32)
    }

    async fn create_scan_run(&self, domain_id: Uuid) -> StorageResult<ScanRun> {
        let run = ScanRun {
            id: Uuid::new_v4(),
            domain_id,
            status: ScanRunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.tables.write().await.scan_runs.push(run.clone());
        debug!(run_id = %run.id, "Scan run created.");
        Ok(run)
    }

    async fn finish_scan_run(&self, run_id: Uuid, status: ScanRunStatus) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let run = tables
            .scan_runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| StorageError::NotFound(format!("scan run {run_id}")))?;
        if run.status != ScanRunStatus::Running {
            return Err(StorageError::Conflict(format!("scan run {run_id} already {}", run.status)));
        }
        run.status = status;
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn latest_findings_for_domain(&self, domain_id: Uuid) -> StorageResult<Vec<FindingRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<FindingRecord> = tables
            .findings
            .iter()
            .filter_map(|finding| {
                let service = tables.services.get(&finding.service_id)?;
                let asset = tables.assets.get(&service.asset_id)?;
                (asset.domain_id == domain_id).then(|| FindingRecord {
                    finding: finding.clone(),
                    ip_address: asset.ip_address,
                    port: service.port,
                })
            })
            .collect();
        records.sort_by(|a, b| b.finding.last_seen.cmp(&a.finding.last_seen));
        Ok(records)
    }

    async fn save_asset(&self, asset: NewAsset) -> StorageResult<Asset> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let key = (asset.domain_id, asset.subdomain.clone(), asset.ip_address);

        if let Some(id) = tables.asset_keys.get(&key).copied() {
            let existing = tables
                .assets
                .get_mut(&id)
                .ok_or_else(|| StorageError::DataAccess(format!("dangling asset key {id}")))?;
            existing.last_seen = now;
            return Ok(existing.clone());
        }

        let record = Asset {
            id: Uuid::new_v4(),
            domain_id: asset.domain_id,
            subdomain: asset.subdomain,
            ip_address: asset.ip_address,
            last_seen: now,
        };
        tables.asset_keys.insert(key, record.id);
        tables.assets.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_service(&self, service: NewService) -> StorageResult<Service> {
        let mut tables = self.tables.write().await;
        if !tables.assets.contains_key(&service.asset_id) {
            return Err(StorageError::NotFound(format!("asset {}", service.asset_id)));
        }
        let now = Utc::now();
        let key = (service.asset_id, service.port, service.protocol);

        if let Some(id) = tables.service_keys.get(&key).copied() {
            let existing = tables
                .services
                .get_mut(&id)
                .ok_or_else(|| StorageError::DataAccess(format!("dangling service key {id}")))?;
            existing.fingerprint = service.fingerprint;
            existing.technology = service.technology;
            existing.last_seen = now;
            return Ok(existing.clone());
        }

        let record = Service {
            id: Uuid::new_v4(),
            asset_id: service.asset_id,
            port: service.port,
            protocol: service.protocol,
            fingerprint: service.fingerprint,
            technology: service.technology,
            last_seen: now,
        };
        tables.service_keys.insert(key, record.id);
        tables.services.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_finding(&self, finding: NewFinding) -> StorageResult<Finding> {
        let mut tables = self.tables.write().await;
        if !tables.services.contains_key(&finding.service_id) {
            return Err(StorageError::NotFound(format!("service {}", finding.service_id)));
        }
        let now = Utc::now();
        let record = Finding {
            id: Uuid::new_v4(),
            service_id: finding.service_id,
            kind: finding.kind,
            severity: finding.severity,
            description: finding.description,
            remediation: finding.remediation,
            first_seen: now,
            last_seen: now,
        };
        tables.findings.push(record.clone());
        Ok(record)
    }

    async fn record_audit(&self, entry: AuditEntry) -> StorageResult<()> {
        self.tables.write().await.audit_log.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SeedDomain, SeedOrganization};
    use crate::core::models::{Severity, Technology};
    use chrono::Duration;

    fn new_asset(domain_id: Uuid) -> NewAsset {
        NewAsset { domain_id, subdomain: "api".into(), ip_address: "10.0.0.5".parse().unwrap() }
    }

    fn new_service(asset_id: Uuid, tech: Technology) -> NewService {
        NewService {
            asset_id,
            port: 2375,
            protocol: Protocol::Tcp,
            fingerprint: "Docker".into(),
            technology: tech,
        }
    }

    #[tokio::test]
    async fn saving_an_asset_twice_refreshes_last_seen() {
        let repo = MemoryRepository::new();
        let domain_id = Uuid::new_v4();

        let first = repo.save_asset(new_asset(domain_id)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.save_asset(new_asset(domain_id)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.last_seen > first.last_seen);
        assert_eq!(repo.assets().await.len(), 1);
    }

    #[tokio::test]
    async fn saving_a_service_twice_updates_in_place() {
        let repo = MemoryRepository::new();
        let asset = repo.save_asset(new_asset(Uuid::new_v4())).await.unwrap();

        let first = repo.save_service(new_service(asset.id, Technology::Unknown)).await.unwrap();
        let second = repo.save_service(new_service(asset.id, Technology::Docker)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.technology, Technology::Docker);
        assert!(second.last_seen >= first.last_seen);
        assert_eq!(repo.services().await.len(), 1);
    }

    #[tokio::test]
    async fn findings_require_a_service() {
        let repo = MemoryRepository::new();
        let err = repo
            .save_finding(NewFinding {
                service_id: Uuid::new_v4(),
                kind: "Insecure Docker API".into(),
                severity: Severity::Critical,
                description: String::new(),
                remediation: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn finished_runs_are_immutable() {
        let repo = MemoryRepository::new();
        let run = repo.create_scan_run(Uuid::new_v4()).await.unwrap();
        assert_eq!(run.status, ScanRunStatus::Running);

        repo.finish_scan_run(run.id, ScanRunStatus::Completed).await.unwrap();
        let err = repo.finish_scan_run(run.id, ScanRunStatus::Failed).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(repo.scan_runs().await[0].status, ScanRunStatus::Completed);
    }

    #[tokio::test]
    async fn quota_counts_only_the_organizations_recent_runs() {
        let repo = MemoryRepository::new();
        let org = repo.insert_organization("acme", 3).await;
        let other = repo.insert_organization("other", 3).await;
        let domain = repo.insert_domain(org, "acme.test", true, "t").await;
        let foreign = repo.insert_domain(other, "other.test", true, "t").await;

        let now = Utc::now();
        repo.insert_scan_run(domain, now - Duration::days(2), ScanRunStatus::Completed).await;
        repo.insert_scan_run(domain, now, ScanRunStatus::Completed).await;
        repo.insert_scan_run(foreign, now, ScanRunStatus::Completed).await;

        let since = now - Duration::hours(1);
        assert_eq!(repo.count_scan_runs_since(org, since).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seed_creates_verified_domains() {
        let mut seed = SeedConfig {
            organizations: vec![SeedOrganization {
                name: "acme".into(),
                daily_scan_limit: 5,
                domains: vec![
                    SeedDomain { name: "acme.test".into(), verified: true, verification_token: None },
                    SeedDomain { name: "pending.test".into(), verified: false, verification_token: Some("tok".into()) },
                ],
            }],
        };
        let repo = MemoryRepository::from_seed(&seed).await;
        let verified = repo.verified_domains().await.unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].root_domain, "acme.test");

        let pending = repo.domain_by_name("PENDING.test").await.unwrap().unwrap();
        assert_eq!(pending.verification_token, "tok");

        assert!(seed.mark_verified("pending.test"));
        let reloaded = MemoryRepository::from_seed(&seed).await;
        assert_eq!(reloaded.verified_domains().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_findings_join_address_and_port() {
        let repo = MemoryRepository::new();
        let domain_id = Uuid::new_v4();
        let asset = repo.save_asset(new_asset(domain_id)).await.unwrap();
        let service = repo.save_service(new_service(asset.id, Technology::Docker)).await.unwrap();
        repo.save_finding(NewFinding {
            service_id: service.id,
            kind: "Insecure Docker API".into(),
            severity: Severity::Critical,
            description: String::new(),
            remediation: String::new(),
        })
        .await
        .unwrap();

        let records = repo.latest_findings_for_domain(domain_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].port, 2375);
        assert_eq!(records[0].ip_address, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert!(repo.latest_findings_for_domain(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
