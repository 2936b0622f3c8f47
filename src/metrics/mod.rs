//! Prometheus metrics for scheduling cycles, tenant runs and remote calls.

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Metric name prefix for all scheduler metrics
const PREFIX: &str = "telemetry_scheduler";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref TENANT_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_tenant_runs_total"), "Per-tenant job invocations by outcome"),
        &["job", "outcome"]
    ).expect("Failed to create tenant_runs_total metric");

    pub static ref REMOTE_RETRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_remote_retries_total"), "Remote call retries by reason"),
        &["reason"]
    ).expect("Failed to create remote_retries_total metric");

    pub static ref TOKEN_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_token_requests_total"), "Identity endpoint requests by result"),
        &["result"]
    ).expect("Failed to create token_requests_total metric");

    pub static ref CYCLES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_cycles_total"),
        "Completed scheduling cycles"
    ).expect("Failed to create cycles_total metric");

    pub static ref CYCLE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_cycle_duration_seconds"),
            "Scheduling cycle duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0])
    ).expect("Failed to create cycle_duration_seconds metric");
}

/// Register all metrics. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(TENANT_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REMOTE_RETRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TOKEN_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CYCLES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CYCLE_DURATION_SECONDS.clone()));
}

pub fn record_tenant_run(job: &str, outcome: &str) {
    TENANT_RUNS_TOTAL.with_label_values(&[job, outcome]).inc();
}

pub fn record_remote_retry(reason: &str) {
    REMOTE_RETRIES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_token_request(result: &str) {
    TOKEN_REQUESTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_cycle(duration: Duration) {
    CYCLES_TOTAL.inc();
    CYCLE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serve `/metrics` until the shutdown token fires.
pub async fn serve_metrics(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Metrics available at port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Metrics server failed")
}
