use super::adapter::TelemetryAdapter;
use crate::auth::CredentialBroker;
use crate::remote::{Backoff, RemoteClient, RemoteSettings, RetryPolicy};
use crate::tenants::Tenant;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared resources handed to every job invocation.
///
/// Cheap to clone; one instance serves a whole fan-out.
#[derive(Clone)]
pub struct TenantContext {
    broker: Arc<CredentialBroker>,
    http: reqwest::Client,
    remote: RemoteSettings,
    policy: RetryPolicy,
    backoff: Arc<dyn Backoff>,
    cancellation_token: CancellationToken,
}

impl TenantContext {
    pub fn new(
        broker: Arc<CredentialBroker>,
        remote: RemoteSettings,
        policy: RetryPolicy,
        backoff: Arc<dyn Backoff>,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        let http = remote.build_http_client()?;
        Ok(Self {
            broker,
            http,
            remote,
            policy,
            backoff,
            cancellation_token,
        })
    }

    /// Telemetry operations authenticated as `tenant`.
    pub fn adapter(&self, tenant: &Tenant) -> TelemetryAdapter {
        let client = RemoteClient::new(
            self.http.clone(),
            &self.remote,
            self.broker.for_tenant(tenant),
            self.policy.clone(),
            Arc::clone(&self.backoff),
            self.cancellation_token.clone(),
        );
        TelemetryAdapter::new(client)
    }

    pub fn broker(&self) -> &Arc<CredentialBroker> {
        &self.broker
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
