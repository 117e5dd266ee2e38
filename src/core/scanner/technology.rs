// src/core/scanner/technology.rs

use crate::core::models::Technology;

/// A rule that identifies one technology by port or by response text.
struct Signature {
    tech: Technology,
    ports: &'static [u16],
    /// Case-insensitive substrings looked for in the fingerprint text.
    needles: &'static [&'static str],
}

/// Evaluated top to bottom, first hit wins. Docker must stay ahead of
/// Kubernetes so a Docker daemon on 2376 is not taken for a cluster service.
static SIGNATURES: &[Signature] = &[
    Signature {
        tech: Technology::Docker,
        ports: &[2375, 2376],
        needles: &["docker", "api-version"],
    },
    Signature {
        tech: Technology::Kubernetes,
        ports: &[6443, 8443, 10250, 10255],
        needles: &["k8s", "kubernetes", "kube", "unauthorized"],
    },
    Signature {
        tech: Technology::Registry,
        ports: &[5000],
        needles: &["docker-distribution-api-version"],
    },
];

/// Maps an open port and its fingerprint text to a known technology.
///
/// A signature matches when the port is one of its ports *or* the text
/// contains one of its needles; the two conditions are alternatives.
pub fn classify(port: u16, fingerprint: &str) -> Technology {
    let text = fingerprint.to_lowercase();
    SIGNATURES
        .iter()
        .find(|sig| sig.ports.contains(&port) || sig.needles.iter().any(|n| text.contains(n)))
        .map(|sig| sig.tech)
        .unwrap_or(Technology::Unknown)
}
