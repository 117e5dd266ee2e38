// src/core/mod.rs

// The scan pipeline itself. Storage, alerting and job plumbing live outside
// `core` and are reached through traits.

/// Data structures shared by every stage of the pipeline, such as
/// `Exposure`, `AttackPath` and `ScanOutcome`.
pub mod models;

/// Network-facing stages: discovery, port probing, fingerprinting and
/// active confirmation probes.
pub mod scanner;

/// Static catalogue of finding titles, descriptions and remediation advice.
pub mod knowledge_base;

/// Severity classification of services and attack path analysis.
pub mod risk;

/// Sequences one full scan of a domain.
pub mod orchestrator;
