//! Common test infrastructure
//!
//! Integration tests talk to [`FakeTelemetryApi`], an in-process HTTP server
//! that plays both the identity endpoint and the telemetry API, with
//! per-path scripted replies. Backoff sleeps go through [`RecordingBackoff`]
//! so retry tests never wait.

mod backoff;
mod fake_api;

pub use backoff::RecordingBackoff;
pub use fake_api::{FakeTelemetryApi, RecordedRequest, Reply};

use std::sync::Arc;
use std::time::Duration;
use telemetry_scheduler::auth::{CredentialBroker, HttpCredentialIssuer};
use telemetry_scheduler::jobs::TenantContext;
use telemetry_scheduler::remote::{RemoteSettings, RetryPolicy};
use telemetry_scheduler::tenants::Tenant;
use telemetry_scheduler::token_cache::InMemoryTokenCache;
use tokio_util::sync::CancellationToken;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn tenant(id: &str) -> Tenant {
    Tenant::new(
        id,
        format!("Tenant {}", id),
        format!("{}-client", id),
        format!("{}-secret", id),
    )
}

pub fn broker_for(api: &FakeTelemetryApi) -> Arc<CredentialBroker> {
    let issuer = HttpCredentialIssuer::new(api.token_url.clone(), REQUEST_TIMEOUT)
        .expect("Failed to build issuer");
    Arc::new(CredentialBroker::new(
        Arc::new(InMemoryTokenCache::new()),
        Arc::new(issuer),
        Duration::from_secs(60),
    ))
}

pub fn remote_settings(api: &FakeTelemetryApi) -> RemoteSettings {
    RemoteSettings::new(api.base_url.clone(), REQUEST_TIMEOUT)
}

/// Context with the default retry policy (3 attempts, 2s base delay).
pub fn context_for(
    api: &FakeTelemetryApi,
    backoff: Arc<RecordingBackoff>,
    cancel: CancellationToken,
) -> TenantContext {
    TenantContext::new(
        broker_for(api),
        remote_settings(api),
        RetryPolicy::default(),
        backoff,
        cancel,
    )
    .expect("Failed to build tenant context")
}
