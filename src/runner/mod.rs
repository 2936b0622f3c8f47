//! Fan-out of one job across every tenant.
//!
//! A tenant's failure, panic included, is recorded in the [`FanOutReport`] and
//! never reaches the caller or the other tenants.

mod process;

pub use process::{
    execute_worker_request, ProcessWorkerPool, WorkerReply, WorkerRequest, WorkerSettings,
};

use crate::jobs::{JobSummary, TenantContext, TenantJob};
use crate::metrics;
use crate::tenants::Tenant;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where tenant invocations execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Tokio tasks inside this process.
    Threaded,
    /// One child process per tenant, at most `workers` at a time.
    Process { workers: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantOutcome {
    Succeeded(JobSummary),
    Failed(String),
    /// Stop was requested before the invocation started.
    Skipped,
}

impl TenantOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TenantOutcome::Succeeded(_) => "succeeded",
            TenantOutcome::Failed(_) => "failed",
            TenantOutcome::Skipped => "skipped",
        }
    }
}

/// Result of running one job over the tenant set.
#[derive(Debug, Clone)]
pub struct FanOutReport {
    pub job_code: String,
    /// One entry per tenant, in tenant order.
    pub outcomes: Vec<(String, TenantOutcome)>,
}

impl FanOutReport {
    pub fn outcome(&self, tenant_id: &str) -> Option<&TenantOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == tenant_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.count("succeeded")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.label() == label)
            .count()
    }
}

/// Runs jobs over tenants, in-process or through a worker pool.
pub struct JobRunner {
    context: TenantContext,
    pool: Option<Arc<ProcessWorkerPool>>,
}

impl JobRunner {
    pub fn threaded(context: TenantContext) -> Self {
        Self {
            context,
            pool: None,
        }
    }

    pub fn with_worker_pool(context: TenantContext, pool: ProcessWorkerPool) -> Self {
        Self {
            context,
            pool: Some(Arc::new(pool)),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match &self.pool {
            Some(pool) => ExecutionMode::Process {
                workers: pool.workers(),
            },
            None => ExecutionMode::Threaded,
        }
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    /// Runs `job` for every tenant concurrently and waits for all of them.
    pub async fn run(&self, job: Arc<dyn TenantJob>, tenants: &[Tenant]) -> FanOutReport {
        let job_code = job.code();
        info!(
            "{} ({}): running for {} tenants",
            job_code,
            job.name(),
            tenants.len()
        );

        let handles: Vec<_> = tenants
            .iter()
            .cloned()
            .map(|tenant| {
                let tenant_id = tenant.id.clone();
                let job = Arc::clone(&job);
                let context = self.context.clone();
                let pool = self.pool.clone();
                let handle =
                    tokio::spawn(async move { run_tenant(job, tenant, context, pool).await });
                (tenant_id, handle)
            })
            .collect();

        let settled = join_all(
            handles
                .into_iter()
                .map(|(tenant_id, handle)| async move { (tenant_id, handle.await) }),
        )
        .await;

        let outcomes: Vec<(String, TenantOutcome)> = settled
            .into_iter()
            .map(|(tenant_id, joined)| {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => {
                        error!("[{}] {} panicked", tenant_id, job_code);
                        TenantOutcome::Failed("job panicked".to_string())
                    }
                    Err(e) => {
                        error!("[{}] {} aborted: {}", tenant_id, job_code, e);
                        TenantOutcome::Failed(e.to_string())
                    }
                };
                metrics::record_tenant_run(job_code, outcome.label());
                (tenant_id, outcome)
            })
            .collect();

        let report = FanOutReport {
            job_code: job_code.to_string(),
            outcomes,
        };
        info!(
            "{}: {} succeeded, {} failed, {} skipped",
            job_code,
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        report
    }
}

async fn run_tenant(
    job: Arc<dyn TenantJob>,
    tenant: Tenant,
    context: TenantContext,
    pool: Option<Arc<ProcessWorkerPool>>,
) -> TenantOutcome {
    if context.is_cancelled() {
        warn!("[{}] {} cancelled before starting", tenant.id, job.code());
        return TenantOutcome::Skipped;
    }

    let outcome = match pool {
        Some(pool) => {
            pool.run_tenant(job.code(), &tenant, context.cancellation_token())
                .await
        }
        None => match job.process_tenant(&tenant, &context).await {
            Ok(summary) => TenantOutcome::Succeeded(summary),
            Err(e) => TenantOutcome::Failed(e.to_string()),
        },
    };

    match &outcome {
        TenantOutcome::Succeeded(summary) => info!(
            "[{}] {} done: {} items ({})",
            tenant.id,
            job.code(),
            summary.items,
            summary.detail
        ),
        TenantOutcome::Failed(reason) => {
            error!("[{}] {} failed: {}", tenant.id, job.code(), reason)
        }
        TenantOutcome::Skipped => {
            warn!("[{}] {} skipped", tenant.id, job.code())
        }
    }
    outcome
}
