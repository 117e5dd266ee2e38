// src/alerting.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AlertingConfig;
use crate::core::models::{AttackPath, Exposure};
use crate::errors::AlertError;

/// Delivers notifications about newly observed exposures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, domain: &str, exposures: &[Exposure]) -> Result<(), AlertError>;
}

/// Receives the attack paths computed at the end of a scan.
pub trait AttackPathSink: Send + Sync {
    fn record(&self, domain: &str, paths: &[AttackPath]);
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    domain: &'a str,
    timestamp: String,
    count: usize,
    /// Human-readable summary for chat and mail relays.
    text: String,
    findings: Vec<&'a Exposure>,
}

/// Plain-text alert body: a header line, then one block per finding.
pub fn format_alert_text(domain: &str, findings: &[&Exposure]) -> String {
    let mut text = format!("Security alert for {domain}: {} critical/high finding(s)\n", findings.len());
    for finding in findings {
        let location = match finding.asset_ip {
            Some(ip) => format!("{ip}:{}", finding.port),
            None => format!("port {}", finding.port),
        };
        text.push_str(&format!(
            "\n[{}] {} on {location}\nDescription: {}\nRemediation: {}\n",
            finding.severity.to_string().to_uppercase(),
            finding.kind,
            finding.description,
            finding.remediation,
        ));
    }
    text
}

/// Logs critical and high exposures and, when configured, posts them to a webhook.
pub struct AlertHandler {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl AlertHandler {
    pub fn new(config: &AlertingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, webhook_url: config.webhook_url.clone() })
    }

    async fn post_webhook(&self, url: &str, payload: &WebhookPayload<'_>) -> Result<(), AlertError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|source| AlertError::Webhook { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::WebhookStatus { url: url.to_string(), status: status.as_u16() });
        }
        info!(%url, count = payload.count, "Webhook alert delivered.");
        Ok(())
    }
}

#[async_trait]
impl AlertSink for AlertHandler {
    async fn send_alert(&self, domain: &str, exposures: &[Exposure]) -> Result<(), AlertError> {
        let urgent: Vec<&Exposure> = exposures.iter().filter(|e| e.severity.is_alertable()).collect();
        if urgent.is_empty() {
            return Ok(());
        }

        for exposure in &urgent {
            warn!(
                %domain,
                finding = %exposure.kind,
                severity = %exposure.severity,
                port = exposure.port,
                asset = ?exposure.asset_ip,
                "New exposure detected."
            );
        }

        let Some(url) = self.webhook_url.as_deref() else {
            return Ok(());
        };
        let payload = WebhookPayload {
            domain,
            timestamp: Utc::now().to_rfc3339(),
            count: urgent.len(),
            text: format_alert_text(domain, &urgent),
            findings: urgent,
        };
        self.post_webhook(url, &payload).await
    }
}

/// Writes every attack path to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAttackPathSink;

impl AttackPathSink for LogAttackPathSink {
    fn record(&self, domain: &str, paths: &[AttackPath]) {
        for path in paths {
            warn!(
                %domain,
                path = %path.id,
                risk = %path.combined_risk,
                score = path.score,
                steps = path.steps.len(),
                "Attack path: {}",
                path.description
            );
        }
    }
}
