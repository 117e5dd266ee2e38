//! Static catalogue of every finding the scanner can raise, with the
//! human-readable title, description and remediation that get persisted
//! alongside it. Risk rules refer to entries by code only.

use crate::core::models::Severity;

pub const INSECURE_DOCKER_API: &str = "INSECURE_DOCKER_API";
pub const EXPOSED_KUBERNETES_API: &str = "EXPOSED_KUBERNETES_API";
pub const EXPOSED_SERVICE: &str = "EXPOSED_SERVICE";
pub const KUBELET_ANONYMOUS_ACCESS: &str = "KUBELET_ANONYMOUS_ACCESS";
pub const DOCKER_API_UNAUTHENTICATED: &str = "DOCKER_API_UNAUTHENTICATED";

/// Everything needed to present and persist a finding.
pub struct FindingDetail {
    /// Machine-readable identifier, e.g. "INSECURE_DOCKER_API".
    pub code: &'static str,
    /// Short title; this is the finding `type` stored and compared for deltas.
    pub title: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub remediation: &'static str,
}

static FINDINGS: &[FindingDetail] = &[
    // --- Basic classification ---
    FindingDetail {
        code: INSECURE_DOCKER_API,
        title: "Insecure Docker API",
        severity: Severity::Critical,
        description: "Docker Remote API is exposed without TLS authentication. An attacker can gain full control over the host.",
        remediation: "Disable the Remote API or enable TLS authentication and restrict access to specific IPs.",
    },
    FindingDetail {
        code: EXPOSED_KUBERNETES_API,
        title: "Exposed Kubernetes API",
        severity: Severity::High,
        description: "A Kubernetes API server was detected. If misconfigured, it could allow unauthorized access to the cluster.",
        remediation: "Ensure the API server requires authentication and is not accessible from the public internet.",
    },
    FindingDetail {
        code: EXPOSED_SERVICE,
        title: "Exposed Service",
        severity: Severity::Info,
        description: "A service was detected on an open port.",
        remediation: "Verify if this service is intended to be public.",
    },
    // --- Confirmed by an active probe ---
    FindingDetail {
        code: KUBELET_ANONYMOUS_ACCESS,
        title: "Kubernetes Kubelet API Anonymous Access",
        severity: Severity::Critical,
        description: "The Kubelet API allows anonymous users to list pods. This can lead to sensitive information disclosure and potential execution of commands in pods.",
        remediation: "Set --anonymous-auth=false and --authorization-mode=Webhook in Kubelet configuration.",
    },
    FindingDetail {
        code: DOCKER_API_UNAUTHENTICATED,
        title: "Exposed Docker Remote API (Unauthenticated)",
        severity: Severity::Critical,
        description: "The Docker Remote API is accessible without authentication. Attackers can execute commands and pull/push images.",
        remediation: "Disable TCP access to the Docker API or enforce MTLS authentication using certificates.",
    },
];

/// Looks up a finding by its code.
pub fn get_finding_detail(code: &str) -> Option<&'static FindingDetail> {
    FINDINGS.iter().find(|detail| detail.code == code)
}

/// Like `get_finding_detail`, for codes that are compiled into the crate.
/// Falls back to the generic exposed-service entry so callers never have to
/// handle a missing static code.
pub fn detail(code: &str) -> &'static FindingDetail {
    get_finding_detail(code).unwrap_or(&FINDINGS[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_is_unique() {
        for (i, a) in FINDINGS.iter().enumerate() {
            for b in &FINDINGS[i + 1..] {
                assert_ne!(a.code, b.code);
            }
        }
    }

    #[test]
    fn unknown_code_falls_back_to_exposed_service() {
        assert!(get_finding_detail("NOPE").is_none());
        assert_eq!(detail("NOPE").code, EXPOSED_SERVICE);
        assert_eq!(detail(INSECURE_DOCKER_API).title, "Insecure Docker API");
    }
}
