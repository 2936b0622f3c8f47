//! RF-015: endpoint metadata.

use crate::jobs::adapter::device_id_of;
use crate::jobs::{JobError, JobSummary, TenantContext, TenantJob};
use crate::tenants::Tenant;
use async_trait::async_trait;
use tracing::info;

/// Largest id batch accepted by the device details endpoint.
const METADATA_BATCH: usize = 50;

/// Lists the tenant's hosts, then fetches details for the first batch.
pub struct EndpointMetadataJob {
    host_limit: u32,
}

impl EndpointMetadataJob {
    pub const CODE: &'static str = "RF-015";

    pub fn new(host_limit: u32) -> Self {
        Self { host_limit }
    }
}

#[async_trait]
impl TenantJob for EndpointMetadataJob {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn name(&self) -> &'static str {
        "Endpoint metadata"
    }

    async fn process_tenant(
        &self,
        tenant: &Tenant,
        ctx: &TenantContext,
    ) -> Result<JobSummary, JobError> {
        let adapter = ctx.adapter(tenant);
        let hosts = adapter.list_hosts(self.host_limit).await?;
        let device_ids: Vec<String> = hosts
            .iter()
            .filter_map(device_id_of)
            .take(METADATA_BATCH)
            .collect();

        if device_ids.is_empty() {
            info!("[{}] {} found no endpoints", tenant.name, Self::CODE);
            return Ok(JobSummary::new(0, "no endpoints"));
        }

        let metadata = adapter.get_device_metadata(&device_ids).await?;
        info!(
            "[{}] {} returned {} endpoints",
            tenant.name,
            Self::CODE,
            metadata.len()
        );
        Ok(JobSummary::new(
            metadata.len(),
            format!("metadata for {} of {} hosts", device_ids.len(), hosts.len()),
        ))
    }
}
