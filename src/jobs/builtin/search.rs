//! Single-query search jobs: RF-016, RF-017, RF-019, RF-021, RF-022, RF-024.
//!
//! Each one issues one adapter search with a configured term and reports the
//! number of matches.

use crate::jobs::{JobError, JobSummary, TenantContext, TenantJob};
use crate::tenants::Tenant;
use async_trait::async_trait;
use tracing::info;

macro_rules! search_job {
    (
        $(#[$doc:meta])*
        $job:ident, $code:literal, $name:literal, $field:ident, $search:ident, $noun:literal
    ) => {
        $(#[$doc])*
        pub struct $job {
            $field: String,
        }

        impl $job {
            pub const CODE: &'static str = $code;

            pub fn new($field: impl Into<String>) -> Self {
                Self {
                    $field: $field.into(),
                }
            }
        }

        #[async_trait]
        impl TenantJob for $job {
            fn code(&self) -> &'static str {
                Self::CODE
            }

            fn name(&self) -> &'static str {
                $name
            }

            async fn process_tenant(
                &self,
                tenant: &Tenant,
                ctx: &TenantContext,
            ) -> Result<JobSummary, JobError> {
                let results = ctx.adapter(tenant).$search(&self.$field).await?;
                info!(
                    "[{}] {} returned {} {}",
                    tenant.name,
                    Self::CODE,
                    results.len(),
                    $noun
                );
                Ok(JobSummary::new(
                    results.len(),
                    format!("{} for {}", $noun, self.$field),
                ))
            }
        }
    };
}

search_job!(
    /// Endpoints matching an IP/CIDR filter.
    SearchDevicesByIpJob, "RF-016", "Search hosts by network", filter, search_devices_by_ip, "hosts"
);

search_job!(
    /// Processes and hosts that ran a file with the given SHA-256.
    SearchFilesByHashJob, "RF-017", "Search files by hash", sha256_hash, search_processes_by_hash, "matches"
);

search_job!(
    SearchFilesByPathJob, "RF-019", "Search files by path", path_pattern, search_files_by_path, "paths"
);

search_job!(
    /// Network contacts with a remote IP or subnet.
    SearchNetworkContactsJob, "RF-021", "Network contacts", remote_ip, search_network_contacts, "contacts"
);

search_job!(
    SearchDomainContactsJob, "RF-022", "Domain contacts", domain_name, search_domain_contacts, "events"
);

search_job!(
    /// Processes whose command line matches a pattern.
    SearchProcessesByCmdJob, "RF-024", "Processes by command line", cmdline_pattern, search_processes_by_cmdline, "processes"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let jobs: Vec<Box<dyn TenantJob>> = vec![
            Box::new(SearchDevicesByIpJob::new("f")),
            Box::new(SearchFilesByHashJob::new("h")),
            Box::new(SearchFilesByPathJob::new("p")),
            Box::new(SearchNetworkContactsJob::new("ip")),
            Box::new(SearchDomainContactsJob::new("d")),
            Box::new(SearchProcessesByCmdJob::new("c")),
        ];
        let mut codes: Vec<&str> = jobs.iter().map(|j| j.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 6);
    }
}
