mod file_config;

pub use file_config::FileConfig;

use crate::jobs::JobParams;
use crate::remote::{RemoteSettings, RetryPolicy};
use crate::runner::{ExecutionMode, WorkerSettings};
use crate::scheduler::SchedulerConfig;
use crate::tenants::Tenant;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExecutionModeKind {
    /// Tokio tasks in this process
    #[default]
    Threaded,
    /// One worker process per tenant
    Process,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub jobs: Vec<String>,
    pub interval_secs: u64,
    pub execution_mode: ExecutionModeKind,
    pub workers: usize,
    pub worker_shutdown_grace_secs: u64,
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub token_safety_margin_secs: u64,
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub token_cache_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            interval_secs: 300,
            execution_mode: ExecutionModeKind::Threaded,
            workers: 4,
            worker_shutdown_grace_secs: 30,
            token_url: None,
            api_base_url: None,
            request_timeout_secs: 10,
            token_safety_margin_secs: crate::auth::DEFAULT_SAFETY_MARGIN_SECS,
            max_attempts: 3,
            base_delay_secs: 2,
            token_cache_path: None,
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jobs: Vec<String>,
    pub interval: Duration,
    pub execution_mode: ExecutionMode,
    pub worker_shutdown_grace: Duration,

    pub token_url: String,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub token_safety_margin: Duration,
    pub retry_policy: RetryPolicy,

    /// SQLite token cache; in-memory cache when unset (threaded mode only).
    pub token_cache_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,

    pub tenants: Vec<Tenant>,
    pub job_params: JobParams,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let jobs = file.jobs.unwrap_or_else(|| cli.jobs.clone());
        if jobs.is_empty() {
            bail!("At least one job code must be specified via --job or in config file");
        }

        let interval_secs = file.interval_secs.unwrap_or(cli.interval_secs);
        if interval_secs == 0 {
            bail!("interval_secs must be greater than zero");
        }

        let mode_kind = match file.execution_mode {
            Some(s) => parse_execution_mode(&s)
                .with_context(|| format!("Invalid execution_mode in config file: {}", s))?,
            None => cli.execution_mode,
        };
        let workers = file.workers.unwrap_or(cli.workers);
        if workers == 0 {
            bail!("workers must be greater than zero");
        }
        let execution_mode = match mode_kind {
            ExecutionModeKind::Threaded => ExecutionMode::Threaded,
            ExecutionModeKind::Process => ExecutionMode::Process { workers },
        };
        let worker_shutdown_grace_secs = file
            .worker_shutdown_grace_secs
            .unwrap_or(cli.worker_shutdown_grace_secs);

        let token_url = file
            .token_url
            .or_else(|| cli.token_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("token_url must be specified via --token-url or in config file")
            })?;
        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "api_base_url must be specified via --api-base-url or in config file"
                )
            })?;

        let request_timeout_secs = file
            .request_timeout_secs
            .unwrap_or(cli.request_timeout_secs);
        let token_safety_margin_secs = file
            .token_safety_margin_secs
            .unwrap_or(cli.token_safety_margin_secs);

        let max_attempts = file.max_attempts.unwrap_or(cli.max_attempts);
        if max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        let base_delay_secs = file.base_delay_secs.unwrap_or(cli.base_delay_secs);

        let token_cache_path = file
            .token_cache_path
            .map(PathBuf::from)
            .or_else(|| cli.token_cache_path.clone());
        // Worker processes can only share credentials through the file cache
        if mode_kind == ExecutionModeKind::Process && token_cache_path.is_none() {
            bail!("token_cache_path is required in process execution mode");
        }

        let metrics_port = file.metrics_port.or(cli.metrics_port);

        Ok(Self {
            jobs,
            interval: Duration::from_secs(interval_secs),
            execution_mode,
            worker_shutdown_grace: Duration::from_secs(worker_shutdown_grace_secs),
            token_url,
            api_base_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            token_safety_margin: Duration::from_secs(token_safety_margin_secs),
            retry_policy: RetryPolicy::new(max_attempts, Duration::from_secs(base_delay_secs)),
            token_cache_path,
            metrics_port,
            tenants: file.tenants.unwrap_or_default(),
            job_params: file.job_params.unwrap_or_default(),
        })
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings::new(self.api_base_url.clone(), self.request_timeout)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            jobs: self.jobs.clone(),
            interval: self.interval,
            job_params: self.job_params.clone(),
        }
    }

    /// Settings shipped to every worker process.
    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        let token_cache_path = self
            .token_cache_path
            .clone()
            .context("token_cache_path is required for worker processes")?;
        Ok(WorkerSettings {
            token_url: self.token_url.clone(),
            api_base_url: self.api_base_url.clone(),
            request_timeout_secs: self.request_timeout.as_secs(),
            token_safety_margin_secs: self.token_safety_margin.as_secs(),
            max_attempts: self.retry_policy.max_attempts,
            base_delay_secs: self.retry_policy.base_delay.as_secs(),
            token_cache_path,
            job_params: self.job_params.clone(),
        })
    }
}

/// Parses an execution mode string using clap's ValueEnum trait.
fn parse_execution_mode(s: &str) -> Result<ExecutionModeKind> {
    ExecutionModeKind::from_str(s, true).map_err(|e| anyhow::anyhow!(e))
}
