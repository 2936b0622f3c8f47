use super::builtin::*;
use super::{JobParams, TenantJob};
use crate::scheduler::SchedulerError;
use std::sync::Arc;

/// Builds a job instance from the configured parameters.
pub type JobFactory = Arc<dyn Fn(&JobParams) -> Arc<dyn TenantJob> + Send + Sync>;

#[derive(Clone)]
pub struct JobDescriptor {
    pub code: &'static str,
    pub name: &'static str,
    factory: JobFactory,
}

impl JobDescriptor {
    pub fn new(
        code: &'static str,
        name: &'static str,
        factory: impl Fn(&JobParams) -> Arc<dyn TenantJob> + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            name,
            factory: Arc::new(factory),
        }
    }

    pub fn instantiate(&self, params: &JobParams) -> Arc<dyn TenantJob> {
        (self.factory)(params)
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("code", &self.code)
            .field("name", &self.name)
            .finish()
    }
}

fn builtin<J: TenantJob + 'static>(
    code: &'static str,
    name: &'static str,
    make: impl Fn(&JobParams) -> J + Send + Sync + 'static,
) -> JobDescriptor {
    JobDescriptor::new(code, name, move |params| {
        Arc::new(make(params)) as Arc<dyn TenantJob>
    })
}

/// Job codes known to the process, in registration order.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    descriptors: Vec<JobDescriptor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in job.
    pub fn with_builtin_jobs() -> Self {
        let descriptors = vec![
            builtin(EndpointMetadataJob::CODE, "Endpoint metadata", |p| {
                EndpointMetadataJob::new(p.host_limit)
            }),
            builtin(SearchDevicesByIpJob::CODE, "Search hosts by network", |p| {
                SearchDevicesByIpJob::new(p.ip_filter.clone())
            }),
            builtin(SearchFilesByHashJob::CODE, "Search files by hash", |p| {
                SearchFilesByHashJob::new(p.sha256_hash.clone())
            }),
            builtin(SearchFilesByPathJob::CODE, "Search files by path", |p| {
                SearchFilesByPathJob::new(p.path_pattern.clone())
            }),
            builtin(SearchNetworkContactsJob::CODE, "Network contacts", |p| {
                SearchNetworkContactsJob::new(p.remote_ip.clone())
            }),
            builtin(SearchDomainContactsJob::CODE, "Domain contacts", |p| {
                SearchDomainContactsJob::new(p.domain_name.clone())
            }),
            builtin(SearchProcessesByCmdJob::CODE, "Processes by command line", |p| {
                SearchProcessesByCmdJob::new(p.cmdline_pattern.clone())
            }),
            builtin(ProcessTreeJob::CODE, "Process tree", |p| {
                ProcessTreeJob::new(p.process_id.clone())
            }),
            builtin(SyncHostsJob::CODE, "Sync hosts", |p| SyncHostsJob::new(p.host_limit)),
            builtin(SyncDetectionsJob::CODE, "Sync detections", |p| {
                SyncDetectionsJob::new(p.detection_filter.clone())
            }),
        ];
        Self { descriptors }
    }

    pub fn register(&mut self, descriptor: JobDescriptor) -> Result<(), SchedulerError> {
        if self.descriptors.iter().any(|d| d.code == descriptor.code) {
            return Err(SchedulerError::DuplicateJob(descriptor.code.to_string()));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, code: &str) -> Result<&JobDescriptor, SchedulerError> {
        self.descriptors
            .iter()
            .find(|d| d.code == code)
            .ok_or_else(|| SchedulerError::UnknownJob(code.to_string()))
    }

    /// Resolves every code, failing on the first unknown one.
    pub fn resolve_all(&self, codes: &[String]) -> Result<Vec<JobDescriptor>, SchedulerError> {
        codes.iter().map(|code| self.lookup(code).cloned()).collect()
    }

    pub fn descriptors(&self) -> &[JobDescriptor] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_codes() {
        let registry = JobRegistry::with_builtin_jobs();
        let codes: Vec<&str> = registry.descriptors().iter().map(|d| d.code).collect();
        for code in [
            "RF-015", "RF-016", "RF-017", "RF-019", "RF-021", "RF-022", "RF-024", "RF-025",
        ] {
            assert!(codes.contains(&code), "missing {}", code);
        }
    }

    #[test]
    fn test_factories_build_matching_jobs() {
        let registry = JobRegistry::with_builtin_jobs();
        let params = JobParams::default();
        for descriptor in registry.descriptors() {
            let job = descriptor.instantiate(&params);
            assert_eq!(job.code(), descriptor.code);
            assert_eq!(job.name(), descriptor.name);
        }
    }

    #[test]
    fn test_lookup_unknown_code() {
        let registry = JobRegistry::with_builtin_jobs();
        match registry.lookup("RF-999") {
            Err(SchedulerError::UnknownJob(code)) => assert_eq!(code, "RF-999"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_all_fails_on_first_unknown() {
        let registry = JobRegistry::with_builtin_jobs();
        let codes = vec![
            "RF-015".to_string(),
            "NOPE".to_string(),
            "RF-016".to_string(),
        ];
        assert!(matches!(
            registry.resolve_all(&codes),
            Err(SchedulerError::UnknownJob(code)) if code == "NOPE"
        ));
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = JobRegistry::with_builtin_jobs();
        let duplicate = registry.lookup("RF-015").unwrap().clone();
        assert!(matches!(
            registry.register(duplicate),
            Err(SchedulerError::DuplicateJob(_))
        ));
    }
}
