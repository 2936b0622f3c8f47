//! Jobs fanned out over tenants against the fake telemetry API.

mod common;

use common::{context_for, tenant, FakeTelemetryApi, RecordingBackoff, Reply};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telemetry_scheduler::jobs::{
    EndpointMetadataJob, JobParams, JobRegistry, SearchNetworkContactsJob, SyncHostsJob,
};
use telemetry_scheduler::runner::{JobRunner, TenantOutcome};
use telemetry_scheduler::scheduler::{
    Scheduler, SchedulerConfig, SchedulerError, SchedulerState,
};
use telemetry_scheduler::tenants::{StaticTenantDirectory, TenantDirectory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const HOSTS: &str = "/devices/queries/devices-scroll/v1";
const DEVICE_DETAILS: &str = "/devices/entities/devices/v2";
const NETWORK_CONTACTS: &str = "/network/queries/contacts/v1";

fn runner_for(api: &FakeTelemetryApi) -> JobRunner {
    JobRunner::threaded(context_for(
        api,
        Arc::new(RecordingBackoff::default()),
        CancellationToken::new(),
    ))
}

fn directory(ids: &[&str]) -> Arc<dyn TenantDirectory> {
    Arc::new(StaticTenantDirectory::new(ids.iter().map(|id| tenant(id)).collect()).unwrap())
}

#[tokio::test]
async fn test_failing_tenant_does_not_affect_others() {
    let api = FakeTelemetryApi::spawn().await;
    api.reject_client("b-client");
    let runner = runner_for(&api);
    let tenants = vec![tenant("a"), tenant("b"), tenant("c")];

    let report = runner
        .run(Arc::new(SyncHostsJob::new(10)), &tenants)
        .await;

    assert_eq!(report.job_code, "SYNC-HOSTS");
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.outcome("a"),
        Some(TenantOutcome::Succeeded(_))
    ));
    assert!(matches!(report.outcome("b"), Some(TenantOutcome::Failed(_))));
    assert!(matches!(
        report.outcome("c"),
        Some(TenantOutcome::Succeeded(_))
    ));

    // Each tenant uses its own credential
    let auth: Vec<String> = api
        .requests_to(HOSTS)
        .into_iter()
        .filter_map(|r| r.authorization)
        .collect();
    assert_eq!(auth.len(), 2);
    assert!(auth.iter().any(|a| a.starts_with("Bearer a-client-token-")));
    assert!(auth.iter().any(|a| a.starts_with("Bearer c-client-token-")));
    assert!(!auth.iter().any(|a| a.starts_with("Bearer b-client")));
}

#[tokio::test]
async fn test_endpoint_metadata_fetches_details_for_listed_hosts() {
    let api = FakeTelemetryApi::spawn().await;
    api.script(HOSTS, vec![Reply::resources(json!(["d1", "d2"]))]);
    api.script(
        DEVICE_DETAILS,
        vec![Reply::resources(json!([
            {"device_id": "d1", "hostname": "web-01"},
            {"device_id": "d2", "hostname": "db-01"}
        ]))],
    );
    let runner = runner_for(&api);

    let report = runner
        .run(Arc::new(EndpointMetadataJob::new(50)), &[tenant("acme")])
        .await;

    match report.outcome("acme") {
        Some(TenantOutcome::Succeeded(summary)) => assert_eq!(summary.items, 2),
        other => panic!("unexpected outcome: {:?}", other),
    }
    let hosts = api.requests_to(HOSTS);
    assert_eq!(hosts[0].query.as_deref(), Some("limit=50"));
    let details = api.requests_to(DEVICE_DETAILS);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].query.as_deref(), Some("ids=d1&ids=d2"));
}

#[tokio::test]
async fn test_endpoint_metadata_skips_details_without_hosts() {
    let api = FakeTelemetryApi::spawn().await;
    let runner = runner_for(&api);

    let report = runner
        .run(Arc::new(EndpointMetadataJob::new(50)), &[tenant("acme")])
        .await;

    match report.outcome("acme") {
        Some(TenantOutcome::Succeeded(summary)) => assert_eq!(summary.items, 0),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(api.requests_to(DEVICE_DETAILS).is_empty());
}

#[tokio::test]
async fn test_search_job_uses_configured_parameter() {
    let api = FakeTelemetryApi::spawn().await;
    api.script(
        NETWORK_CONTACTS,
        vec![Reply::resources(json!(["c1", "c2", "c3"]))],
    );
    let runner = runner_for(&api);

    let report = runner
        .run(
            Arc::new(SearchNetworkContactsJob::new("10.0.0.7")),
            &[tenant("acme")],
        )
        .await;

    assert_eq!(report.job_code, "RF-021");
    match report.outcome("acme") {
        Some(TenantOutcome::Succeeded(summary)) => assert_eq!(summary.items, 3),
        other => panic!("unexpected outcome: {:?}", other),
    }
    let requests = api.requests_to(NETWORK_CONTACTS);
    assert_eq!(requests[0].query.as_deref(), Some("remote_ip=10.0.0.7"));
}

#[tokio::test]
async fn test_scheduler_rejects_unknown_job_before_any_request() {
    let api = FakeTelemetryApi::spawn().await;
    let scheduler = Scheduler::new(
        SchedulerConfig {
            jobs: vec!["SYNC-HOSTS".to_string(), "RF-999".to_string()],
            interval: Duration::from_secs(3600),
            job_params: JobParams::default(),
        },
        Arc::new(JobRegistry::with_builtin_jobs()),
        directory(&["a", "b"]),
        Arc::new(runner_for(&api)),
    );

    let result = scheduler.run().await;

    assert!(matches!(result, Err(SchedulerError::UnknownJob(code)) if code == "RF-999"));
    assert_eq!(scheduler.handle().state(), SchedulerState::Idle);
    assert!(api.requests().is_empty());
    assert_eq!(api.issued_tokens(), 0);
}

#[tokio::test]
async fn test_scheduler_cycle_reports_every_job_and_stops() {
    let api = FakeTelemetryApi::spawn().await;
    api.set_default(
        HOSTS,
        Reply::resources(json!(["d1", "d2", "d3"])),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(
        SchedulerConfig {
            jobs: vec!["SYNC-HOSTS".to_string(), "SYNC-DETECTIONS".to_string()],
            interval: Duration::from_secs(3600),
            job_params: JobParams::default(),
        },
        Arc::new(JobRegistry::with_builtin_jobs()),
        directory(&["a", "b"]),
        Arc::new(runner_for(&api)),
    )
    .with_cycle_reports(tx);
    let handle = scheduler.handle();

    let observer = async {
        let report = rx.recv().await.expect("No cycle report");
        handle.stop();
        report
    };
    let (result, report) = tokio::join!(scheduler.run(), observer);

    assert_eq!(result.unwrap(), 1);
    assert_eq!(handle.state(), SchedulerState::Stopped);
    assert_eq!(report.cycle, 1);
    assert_eq!(report.reports.len(), 2);
    for fan_out in &report.reports {
        assert_eq!(fan_out.succeeded(), 2, "{}", fan_out.job_code);
    }
    let hosts = report
        .reports
        .iter()
        .find(|r| r.job_code == "SYNC-HOSTS")
        .unwrap();
    match hosts.outcome("a") {
        Some(TenantOutcome::Succeeded(summary)) => assert_eq!(summary.items, 3),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(api.requests_to(HOSTS).len(), 2);
}
