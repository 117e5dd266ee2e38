// src/errors.rs

use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a scan run. Everything else in the pipeline is
/// best-effort and degrades to missing data instead of an error.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("domain {0} not found")]
    DomainNotFound(Uuid),

    #[error("organization {0} not found")]
    OrganizationNotFound(Uuid),

    #[error("daily scan quota exceeded for organization {org_id} ({used}/{limit})")]
    QuotaExceeded { org_id: Uuid, used: u32, limit: u32 },

    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Failures raised while enumerating subassets.
///
/// Only `RootUnresolvable` is ever returned from the discovery engine; the
/// other variants are produced by the individual sources and logged there.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("neither '{domain}' nor any of its subdomains could be resolved")]
    RootUnresolvable { domain: String },

    #[error("DNS resolution failed for '{domain}': {source}")]
    Resolver {
        domain: String,
        #[source]
        source: hickory_resolver::error::ResolveError,
    },

    #[error("certificate transparency query failed: {0}")]
    CertificateTransparency(String),

    #[error("TLS certificate inspection failed for '{domain}': {reason}")]
    Tls { domain: String, reason: String },
}

/// Generic data-access error surfaced by a `Repository`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("data access failed: {0}")]
    DataAccess(String),
}

/// Alert delivery failure. Advisory only: it is logged, never returned to a scan caller.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("failed to deliver webhook alert to '{url}': {source}")]
    Webhook {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("webhook '{url}' answered with status {status}")]
    WebhookStatus { url: String, status: u16 },
}

/// Failure to load the application configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON for config file '{path}': {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
}
