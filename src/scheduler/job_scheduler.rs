use super::handle::SchedulerHandle;
use super::SchedulerError;
use crate::jobs::{JobDescriptor, JobParams, JobRegistry};
use crate::metrics;
use crate::runner::{FanOutReport, JobRunner};
use crate::tenants::{Tenant, TenantDirectory};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Job codes run every cycle.
    pub jobs: Vec<String>,
    /// Wait between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub job_params: JobParams,
}

/// Outcome of one scheduling cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle counter.
    pub cycle: u64,
    pub cycle_id: Uuid,
    pub reports: Vec<FanOutReport>,
}

/// Runs the configured jobs over all active tenants, forever, until stopped.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    directory: Arc<dyn TenantDirectory>,
    runner: Arc<JobRunner>,
    handle: SchedulerHandle,
    cycle_reports: Option<mpsc::UnboundedSender<CycleReport>>,
}

impl Scheduler {
    /// The stop signal is the runner context's cancellation token, so a stop
    /// also reaches in-flight tenants and their backoff sleeps.
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<JobRegistry>,
        directory: Arc<dyn TenantDirectory>,
        runner: Arc<JobRunner>,
    ) -> Self {
        let handle = SchedulerHandle::new(runner.context().cancellation_token().clone());
        Self {
            config,
            registry,
            directory,
            runner,
            handle,
            cycle_reports: None,
        }
    }

    /// Publishes every finished cycle on `sender`.
    pub fn with_cycle_reports(mut self, sender: mpsc::UnboundedSender<CycleReport>) -> Self {
        self.cycle_reports = Some(sender);
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Main loop. Returns the number of completed cycles once stopped.
    ///
    /// Every job code is resolved before any tenant work; an unknown code
    /// fails the call without running anything.
    pub async fn run(&self) -> Result<u64, SchedulerError> {
        let descriptors = self.registry.resolve_all(&self.config.jobs)?;
        self.handle.begin()?;

        info!(
            "Starting scheduler: jobs {:?}, interval {:?}, mode {:?}",
            self.config.jobs,
            self.config.interval,
            self.runner.mode()
        );

        let stop_token = self.handle.stop_token().clone();
        let mut cycles = 0;
        loop {
            if stop_token.is_cancelled() {
                break;
            }

            cycles += 1;
            let report = self.run_cycle(cycles, &descriptors).await;
            if let Some(sender) = &self.cycle_reports {
                let _ = sender.send(report);
            }

            debug!("Scheduler sleeping for {:?}", self.config.interval);
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = stop_token.cancelled() => {
                    info!("Scheduler received stop signal");
                    break;
                }
            }
        }

        self.handle.finish();
        info!("Scheduler stopped after {} cycles", cycles);
        Ok(cycles)
    }

    async fn run_cycle(&self, cycle: u64, descriptors: &[JobDescriptor]) -> CycleReport {
        let started = Instant::now();
        let cycle_id = Uuid::new_v4();
        info!("Cycle {} ({}) starting", cycle, cycle_id);

        let tenants = self.load_tenants();
        let reports = if tenants.is_empty() {
            warn!("Cycle {}: no active tenants", cycle);
            Vec::new()
        } else {
            let fan_outs = descriptors.iter().map(|descriptor| {
                let job = descriptor.instantiate(&self.config.job_params);
                self.runner.run(job, &tenants)
            });
            join_all(fan_outs).await
        };

        let elapsed = started.elapsed();
        metrics::record_cycle(elapsed);
        info!(
            "Cycle {} ({}) finished in {:.2}s",
            cycle,
            cycle_id,
            elapsed.as_secs_f64()
        );
        CycleReport {
            cycle,
            cycle_id,
            reports,
        }
    }

    fn load_tenants(&self) -> Vec<Tenant> {
        match self.directory.list_active_tenants() {
            Ok(tenants) => {
                info!("Loaded {} active tenants", tenants.len());
                tenants
            }
            Err(e) => {
                error!("Failed to list active tenants: {:#}", e);
                Vec::new()
            }
        }
    }
}
