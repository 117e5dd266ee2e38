// src/core/scanner/exposure_probe.rs

//! Narrow, read-only requests that confirm an unauthenticated management
//! API once a technology has been classified. A transport error simply
//! means "not confirmed".

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::core::knowledge_base::{self, DOCKER_API_UNAUTHENTICATED, KUBELET_ANONYMOUS_ACCESS};
use crate::core::models::ConfirmedExposure;

/// Lists pods on a kubelet; a 200 means anonymous access is enabled.
pub async fn probe_kubelet(client: &reqwest::Client, url: &str) -> Option<ConfirmedExposure> {
    confirm_on_ok(client, url, KUBELET_ANONYMOUS_ACCESS).await
}

/// Asks a Docker daemon for its version; a 200 means the API is open.
pub async fn probe_docker(client: &reqwest::Client, url: &str) -> Option<ConfirmedExposure> {
    confirm_on_ok(client, url, DOCKER_API_UNAUTHENTICATED).await
}

async fn confirm_on_ok(client: &reqwest::Client, url: &str, code: &'static str) -> Option<ConfirmedExposure> {
    match client.get(url).send().await {
        Ok(res) if res.status() == StatusCode::OK => {
            let detail = knowledge_base::detail(code);
            warn!(%url, finding = detail.title, "Unauthenticated access confirmed.");
            Some(ConfirmedExposure { code, severity: detail.severity })
        }
        Ok(res) => {
            debug!(%url, status = %res.status(), "Probe answered, access not confirmed.");
            None
        }
        Err(e) => {
            debug!(%url, error = %e, "Probe request failed.");
            None
        }
    }
}
