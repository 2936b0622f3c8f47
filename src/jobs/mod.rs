//! Per-tenant data-collection jobs.
//!
//! A job is a stateless unit of work run once per tenant per cycle. The
//! [`JobRunner`](crate::runner::JobRunner) fans it out; the job itself only
//! talks to the telemetry API through the [`TelemetryAdapter`] handed out by
//! its [`TenantContext`].

mod adapter;
mod builtin;
mod context;
mod params;
mod registry;

pub use adapter::TelemetryAdapter;
pub use builtin::{
    EndpointMetadataJob, ProcessTreeJob, SearchDevicesByIpJob, SearchDomainContactsJob,
    SearchFilesByHashJob, SearchFilesByPathJob, SearchNetworkContactsJob,
    SearchProcessesByCmdJob, SyncDetectionsJob, SyncHostsJob,
};
pub use context::TenantContext;
pub use params::JobParams;
pub use registry::{JobDescriptor, JobRegistry};

use crate::remote::RemoteError;
use crate::tenants::Tenant;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a job reports back for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Number of records the job collected.
    pub items: usize,
    pub detail: String,
}

impl JobSummary {
    pub fn new(items: usize, detail: impl Into<String>) -> Self {
        Self {
            items,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Remote(RemoteError),
    /// Stop arrived while the job was waiting to retry a call.
    #[error("cancelled while retrying {operation}")]
    Cancelled { operation: String },
}

impl From<RemoteError> for JobError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Cancelled { operation } => JobError::Cancelled { operation },
            other => JobError::Remote(other),
        }
    }
}

/// A named data-collection job.
#[async_trait]
pub trait TenantJob: Send + Sync {
    /// Registry code, e.g. `RF-015`.
    fn code(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Collect data for one tenant.
    ///
    /// Errors are contained by the runner; they never affect other tenants.
    async fn process_tenant(
        &self,
        tenant: &Tenant,
        ctx: &TenantContext,
    ) -> Result<JobSummary, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_backoff_becomes_cancelled() {
        let e: JobError = RemoteError::Cancelled {
            operation: "/devices/queries/devices-scroll/v1".to_string(),
        }
        .into();
        match &e {
            JobError::Cancelled { operation } => {
                assert_eq!(operation, "/devices/queries/devices-scroll/v1")
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(e.to_string().starts_with("cancelled while retrying"));
    }

    #[test]
    fn test_other_remote_errors_pass_through() {
        let e: JobError = RemoteError::RateLimited {
            operation: "/detects/queries/detects/v1".to_string(),
        }
        .into();
        assert!(matches!(e, JobError::Remote(RemoteError::RateLimited { .. })));
        assert_eq!(e.to_string(), "/detects/queries/detects/v1: rate limited");
    }
}
