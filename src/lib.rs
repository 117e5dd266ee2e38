// src/lib.rs

//! External attack-surface scanner: discovers the subassets of a verified
//! domain, probes them for exposed container and orchestration services,
//! and reports what changed since the previous scan.

pub mod alerting;
pub mod config;
pub mod core;
pub mod errors;
pub mod jobs;
pub mod logging;
pub mod storage;
