//! RF-025: process tree reconstruction.

use crate::jobs::{JobError, JobSummary, TenantContext, TenantJob};
use crate::tenants::Tenant;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::info;

pub struct ProcessTreeJob {
    process_id: String,
}

impl ProcessTreeJob {
    pub const CODE: &'static str = "RF-025";

    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
        }
    }
}

fn child_count(tree: &JsonValue) -> usize {
    tree.get("children")
        .and_then(JsonValue::as_array)
        .map_or(0, Vec::len)
}

#[async_trait]
impl TenantJob for ProcessTreeJob {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn name(&self) -> &'static str {
        "Process tree"
    }

    async fn process_tenant(
        &self,
        tenant: &Tenant,
        ctx: &TenantContext,
    ) -> Result<JobSummary, JobError> {
        let tree = ctx.adapter(tenant).get_process_tree(&self.process_id).await?;
        let children = child_count(&tree);
        info!(
            "[{}] {} returned {} children for {}",
            tenant.name,
            Self::CODE,
            children,
            self.process_id
        );
        Ok(JobSummary::new(
            children,
            format!("children of {}", self.process_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_count() {
        assert_eq!(child_count(&json!({"children": [{}, {}]})), 2);
        assert_eq!(child_count(&json!({"children": "none"})), 0);
        assert_eq!(child_count(&JsonValue::Null), 0);
    }
}
