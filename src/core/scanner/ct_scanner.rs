// src/core/scanner/ct_scanner.rs

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::errors::DiscoveryError;

static RE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]([a-z0-9_-]*[a-z0-9_])?(\.[a-z0-9_]([a-z0-9_-]*[a-z0-9_])?)*$").unwrap());

/// One row of a crt.sh JSON answer. `name_value` may hold several
/// newline-separated names.
#[derive(Debug, Deserialize)]
pub struct CtEntry {
    pub name_value: String,
}

/// Queries the certificate transparency log for every certificate issued
/// under `*.root` and returns the distinct subdomain labels it names.
pub async fn query_ct_log(
    client: &reqwest::Client,
    base_url: &str,
    root: &str,
) -> Result<BTreeSet<String>, DiscoveryError> {
    let url = Url::parse_with_params(base_url, &[("q", format!("%.{root}")), ("output", "json".to_string())])
        .map_err(|e| DiscoveryError::CertificateTransparency(format!("bad CT url: {e}")))?;

    info!(domain = %root, "Querying certificate transparency log.");
    let entries: Vec<CtEntry> = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DiscoveryError::CertificateTransparency(e.to_string()))?
        .json()
        .await
        .map_err(|e| DiscoveryError::CertificateTransparency(format!("unreadable CT response: {e}")))?;

    let labels = labels_from_names(entries.iter().flat_map(|e| e.name_value.lines()), root);
    debug!(entries = entries.len(), labels = labels.len(), "CT log parsed.");
    Ok(labels)
}

/// Reduces raw certificate names to labels of strict subdomains of `root`.
/// A leading `*.` is stripped; anything still containing a wildcard or not
/// shaped like a host name is dropped.
pub fn labels_from_names<'a>(names: impl IntoIterator<Item = &'a str>, root: &str) -> BTreeSet<String> {
    let root = root.trim_end_matches('.').to_lowercase();
    let suffix = format!(".{root}");

    names
        .into_iter()
        .filter_map(|raw| {
            let name = raw.trim().trim_end_matches('.').to_lowercase();
            let name = name.strip_prefix("*.").unwrap_or(&name);
            let label = name.strip_suffix(&suffix)?;
            (!label.contains('*') && RE_LABEL.is_match(label)).then(|| label.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_strict_subdomains() {
        let names = [
            "example.com",
            "api.example.com",
            "*.dev.example.com",
            "API.Example.com",
            "evilexample.com",
            "mail.other.org",
            "a.*.example.com",
            "",
        ];
        let labels = labels_from_names(names, "example.com");
        let expected: BTreeSet<String> = ["api", "dev"].iter().map(|s| s.to_string()).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn multi_line_entries_are_split() {
        let entries: Vec<CtEntry> = serde_json::from_str(
            r#"[{"name_value": "www.example.com\nstaging.example.com"}, {"name_value": "www.example.com"}]"#,
        )
        .unwrap();
        let labels = labels_from_names(entries.iter().flat_map(|e| e.name_value.lines()), "example.com");
        assert_eq!(labels.len(), 2);
        assert!(labels.contains("staging"));
    }
}
