// tests/orchestrator_test.rs

mod common;

use common::{harness, ip, seeded, FakeDiscovery, FakeInspector, FakePorts, RecordingAlerts};
use surface_rs_scanner::config::DeltaKeyStrategy;
use surface_rs_scanner::core::knowledge_base::{self, DOCKER_API_UNAUTHENTICATED, KUBELET_ANONYMOUS_ACCESS};
use surface_rs_scanner::core::models::{ConfirmedExposure, DiscoveredAsset, Severity, Technology};
use surface_rs_scanner::errors::ScanError;
use surface_rs_scanner::storage::{AuditEvent, Repository, ScanRunStatus};

fn api_asset() -> DiscoveredAsset {
    DiscoveredAsset::new("api", [ip("10.0.0.5")])
}

fn docker_host() -> (FakePorts, FakeInspector) {
    (
        FakePorts::default().open("10.0.0.5", &[2375]),
        FakeInspector::default().body("10.0.0.5", 2375, "Docker"),
    )
}

#[tokio::test]
async fn test_first_scan_reports_insecure_docker_api() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let (ports, inspector) = docker_host();
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    let outcome = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(outcome.assets, vec![api_asset()]);
    assert_eq!(outcome.all_findings.len(), 1);
    let finding = &outcome.all_findings[0];
    assert_eq!(finding.kind, "Insecure Docker API");
    assert_eq!(finding.severity, Severity::Critical);
    assert_eq!(finding.technology, Technology::Docker);
    assert_eq!(finding.port, 2375);
    assert_eq!(finding.asset_ip, Some(ip("10.0.0.5")));
    assert_eq!(outcome.new_findings, outcome.all_findings);

    let services = h.repo.services().await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].technology, Technology::Docker);
    assert_eq!(h.repo.findings().await.len(), 1);

    let runs = h.repo.scan_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, ScanRunStatus::Completed);
    assert!(runs[0].finished_at.is_some());

    assert_eq!(h.alerts.calls(), 1);
    let actions: Vec<AuditEvent> = h.repo.audit_log().await.into_iter().map(|e| e.event).collect();
    assert!(matches!(actions[0], AuditEvent::ScanStart { .. }));
    assert!(matches!(actions[1], AuditEvent::ScanComplete { findings: 1, new_findings: 1, .. }));
}

#[tokio::test]
async fn test_rescan_reports_no_new_findings() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let (ports, inspector) = docker_host();
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    h.orchestrator.run_scan("example.com", domain_id).await.unwrap();
    let second = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(second.all_findings.len(), 1);
    assert!(second.new_findings.is_empty());
    assert_eq!(h.alerts.calls(), 1);
    assert_eq!(h.repo.assets().await.len(), 1);
    assert_eq!(h.repo.services().await.len(), 1);
}

#[tokio::test]
async fn test_quota_exhausted_creates_no_run() {
    let (repo, domain_id) = seeded("example.com", 1).await;
    let (ports, inspector) = docker_host();
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    h.orchestrator.run_scan("example.com", domain_id).await.unwrap();
    let err = h.orchestrator.run_scan("example.com", domain_id).await.unwrap_err();

    assert!(matches!(err, ScanError::QuotaExceeded { used: 1, limit: 1, .. }));
    assert_eq!(h.repo.scan_runs().await.len(), 1);
}

#[tokio::test]
async fn test_unknown_domain_is_rejected() {
    let (repo, _) = seeded("example.com", 10).await;
    let h = harness(repo, FakeDiscovery::with(vec![]), FakePorts::default(), FakeInspector::default(), RecordingAlerts::default());

    let missing = uuid::Uuid::new_v4();
    let err = h.orchestrator.run_scan("nowhere.test", missing).await.unwrap_err();
    assert!(matches!(err, ScanError::DomainNotFound(id) if id == missing));
    assert!(h.repo.scan_runs().await.is_empty());
}

#[tokio::test]
async fn test_discovery_failure_marks_run_failed() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let h = harness(repo, FakeDiscovery::failing(), FakePorts::default(), FakeInspector::default(), RecordingAlerts::default());

    let err = h.orchestrator.run_scan("example.com", domain_id).await.unwrap_err();

    assert!(matches!(err, ScanError::Discovery(_)));
    let runs = h.repo.scan_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, ScanRunStatus::Failed);
    assert!(h.repo.assets().await.is_empty());
    assert!(h
        .repo
        .audit_log()
        .await
        .iter()
        .any(|e| matches!(e.event, AuditEvent::ScanFailed { .. })));
    assert_eq!(h.alerts.calls(), 0);
}

#[tokio::test]
async fn test_assets_without_address_are_skipped() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let assets = vec![DiscoveredAsset::new("ghost", []), api_asset()];
    let (ports, inspector) = docker_host();
    let h = harness(repo, FakeDiscovery::with(assets), ports, inspector, RecordingAlerts::default());

    let outcome = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(outcome.assets.len(), 2);
    assert_eq!(h.repo.assets().await.len(), 1);
    assert_eq!(outcome.all_findings.len(), 1);
}

#[tokio::test]
async fn test_info_services_are_stored_without_findings() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let ports = FakePorts::default().open("10.0.0.5", &[80]);
    let inspector = FakeInspector::default().body("10.0.0.5", 80, "<html>nginx</html>");
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    let outcome = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert!(outcome.all_findings.is_empty());
    assert_eq!(h.repo.services().await.len(), 1);
    assert!(h.repo.findings().await.is_empty());
    assert_eq!(h.alerts.calls(), 0);
}

#[tokio::test]
async fn test_confirmed_probe_replaces_basic_finding() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let ports = FakePorts::default().open("10.0.0.5", &[2375]);
    let inspector = FakeInspector::default().body("10.0.0.5", 2375, "Docker").confirm(
        "10.0.0.5",
        2375,
        ConfirmedExposure { code: DOCKER_API_UNAUTHENTICATED, severity: Severity::Critical },
    );
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    let outcome = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    let finding = &outcome.all_findings[0];
    assert_eq!(finding.kind, knowledge_base::detail(DOCKER_API_UNAUTHENTICATED).title);
    assert_eq!(finding.port, 2375);
    assert_eq!(h.repo.findings().await[0].kind, finding.kind);
}

#[tokio::test]
async fn test_attack_paths_go_to_the_sink() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let ports = FakePorts::default().open("10.0.0.5", &[2375, 10250]);
    let inspector = FakeInspector::default().body("10.0.0.5", 2375, "Docker").confirm(
        "10.0.0.5",
        10250,
        ConfirmedExposure { code: KUBELET_ANONYMOUS_ACCESS, severity: Severity::Critical },
    );
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    let outcome = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(outcome.all_findings.len(), 2);
    let paths = h.paths.paths.lock().unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].id, "multi-critical-10.0.0.5");
    assert_eq!(paths[0].combined_risk, Severity::Critical);
}

#[tokio::test]
async fn test_alert_failure_does_not_fail_scan() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let (ports, inspector) = docker_host();
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::failing());

    let outcome = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(outcome.new_findings.len(), 1);
    assert_eq!(h.alerts.calls(), 1);
    assert_eq!(h.repo.scan_runs().await[0].status, ScanRunStatus::Completed);
}

#[tokio::test]
async fn test_asset_port_type_delta_distinguishes_hosts() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let ports = FakePorts::default().open("10.0.0.5", &[2375]).open("10.0.0.6", &[2375]);
    let inspector = FakeInspector::default()
        .body("10.0.0.5", 2375, "Docker")
        .body("10.0.0.6", 2375, "Docker");
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());
    let orchestrator = h.orchestrator.with_delta_key(DeltaKeyStrategy::AssetPortType);

    orchestrator.run_scan("example.com", domain_id).await.unwrap();
    h.discovery.set(vec![api_asset(), DiscoveredAsset::new("ci", [ip("10.0.0.6")])]);
    let second = orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(second.all_findings.len(), 2);
    assert_eq!(second.new_findings.len(), 1);
    assert_eq!(second.new_findings[0].asset_ip, Some(ip("10.0.0.6")));
}

#[tokio::test]
async fn test_type_severity_delta_collapses_hosts() {
    let (repo, domain_id) = seeded("example.com", 10).await;
    let ports = FakePorts::default().open("10.0.0.5", &[2375]).open("10.0.0.6", &[2375]);
    let inspector = FakeInspector::default()
        .body("10.0.0.5", 2375, "Docker")
        .body("10.0.0.6", 2375, "Docker");
    let h = harness(repo, FakeDiscovery::with(vec![api_asset()]), ports, inspector, RecordingAlerts::default());

    h.orchestrator.run_scan("example.com", domain_id).await.unwrap();
    h.discovery.set(vec![api_asset(), DiscoveredAsset::new("ci", [ip("10.0.0.6")])]);
    let second = h.orchestrator.run_scan("example.com", domain_id).await.unwrap();

    assert_eq!(second.all_findings.len(), 2);
    assert!(second.new_findings.is_empty());
    assert!(h.repo.domain_by_id(domain_id).await.unwrap().is_some());
}
