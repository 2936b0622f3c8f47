//! Host and detection synchronisation.

use crate::jobs::{JobError, JobSummary, TenantContext, TenantJob};
use crate::tenants::Tenant;
use async_trait::async_trait;
use tracing::info;

pub struct SyncHostsJob {
    limit: u32,
}

impl SyncHostsJob {
    pub const CODE: &'static str = "SYNC-HOSTS";

    pub fn new(limit: u32) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl TenantJob for SyncHostsJob {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn name(&self) -> &'static str {
        "Sync hosts"
    }

    async fn process_tenant(
        &self,
        tenant: &Tenant,
        ctx: &TenantContext,
    ) -> Result<JobSummary, JobError> {
        let hosts = ctx.adapter(tenant).list_hosts(self.limit).await?;
        info!("[{}] {} hosts synchronised", tenant.name, hosts.len());
        Ok(JobSummary::new(hosts.len(), "hosts synchronised"))
    }
}

pub struct SyncDetectionsJob {
    filter: String,
}

impl SyncDetectionsJob {
    pub const CODE: &'static str = "SYNC-DETECTIONS";

    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
        }
    }
}

#[async_trait]
impl TenantJob for SyncDetectionsJob {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn name(&self) -> &'static str {
        "Sync detections"
    }

    async fn process_tenant(
        &self,
        tenant: &Tenant,
        ctx: &TenantContext,
    ) -> Result<JobSummary, JobError> {
        let detections = ctx.adapter(tenant).list_detections(&self.filter).await?;
        info!(
            "[{}] {} detections synchronised",
            tenant.name,
            detections.len()
        );
        Ok(JobSummary::new(detections.len(), "detections synchronised"))
    }
}
