// src/storage/mod.rs

//! Persistence boundary of the scanner. The orchestrator, scheduler and CLI
//! only ever talk to a `Repository`; `memory` provides the in-process store.

pub mod memory;

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::core::models::{Protocol, Severity, Technology};
use crate::errors::StorageError;

pub use self::memory::MemoryRepository;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub daily_scan_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    pub id: Uuid,
    pub org_id: Uuid,
    pub root_domain: String,
    pub verified: bool,
    pub verification_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub subdomain: String,
    pub ip_address: IpAddr,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub domain_id: Uuid,
    pub subdomain: String,
    pub ip_address: IpAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub port: u16,
    pub protocol: Protocol,
    pub fingerprint: String,
    pub technology: Technology,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub asset_id: Uuid,
    pub port: u16,
    pub protocol: Protocol,
    pub fingerprint: String,
    pub technology: Technology,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub id: Uuid,
    pub service_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub remediation: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFinding {
    pub service_id: Uuid,
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub remediation: String,
}

/// A stored finding joined with the address and port of its service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingRecord {
    pub finding: Finding,
    pub ip_address: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanRun {
    pub id: Uuid,
    pub domain_id: Uuid,
    pub status: ScanRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Audit metadata, one variant per recorded action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    ScanStart { domain: String },
    ScanComplete { domain: String, findings: usize, new_findings: usize },
    ScanFailed { domain: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub org_id: Option<Uuid>,
    #[serde(flatten)]
    pub event: AuditEvent,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(org_id: Option<Uuid>, event: AuditEvent) -> Self {
        Self { org_id, event, created_at: Utc::now() }
    }
}

/// Durable state used by the scan pipeline.
///
/// Asset and service saves are upserts on their natural keys
/// (`domain_id, subdomain, ip_address` and `asset_id, port, protocol`):
/// saving the same key again refreshes `last_seen` and returns the
/// existing id. Findings are always inserted.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn domain_by_id(&self, id: Uuid) -> StorageResult<Option<Domain>>;

    async fn domain_by_name(&self, root_domain: &str) -> StorageResult<Option<Domain>>;

    async fn verified_domains(&self) -> StorageResult<Vec<Domain>>;

    async fn organization(&self, id: Uuid) -> StorageResult<Option<Organization>>;

    /// Scan runs started at or after `since` for any domain of the organization.
    async fn count_scan_runs_since(&self, org_id: Uuid, since: DateTime<Utc>) -> StorageResult<u32>;

    /// Inserts a run in the `running` state.
    async fn create_scan_run(&self, domain_id: Uuid) -> StorageResult<ScanRun>;

    /// Moves a running run to its final status. Finished runs are immutable.
    async fn finish_scan_run(&self, run_id: Uuid, status: ScanRunStatus) -> StorageResult<()>;

    /// Every finding recorded for the domain, most recently seen first.
    async fn latest_findings_for_domain(&self, domain_id: Uuid) -> StorageResult<Vec<FindingRecord>>;

    async fn save_asset(&self, asset: NewAsset) -> StorageResult<Asset>;

    async fn save_service(&self, service: NewService) -> StorageResult<Service>;

    async fn save_finding(&self, finding: NewFinding) -> StorageResult<Finding>;

    async fn record_audit(&self, entry: AuditEntry) -> StorageResult<()>;
}
