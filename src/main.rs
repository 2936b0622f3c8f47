use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use telemetry_scheduler::auth::{
    CredentialBroker, HttpCredentialIssuer, DEFAULT_SAFETY_MARGIN_SECS,
};
use telemetry_scheduler::config::{self, ExecutionModeKind};
use telemetry_scheduler::jobs::{JobRegistry, TenantContext};
use telemetry_scheduler::metrics;
use telemetry_scheduler::remote::TokioBackoff;
use telemetry_scheduler::runner::{
    execute_worker_request, ExecutionMode, JobRunner, ProcessWorkerPool, WorkerReply,
    WorkerRequest,
};
use telemetry_scheduler::scheduler::{Scheduler, SchedulerHandle};
use telemetry_scheduler::tenants::{StaticTenantDirectory, TenantDirectory};
use telemetry_scheduler::token_cache::{InMemoryTokenCache, SqliteTokenCache, TokenCache};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version = VERSION, about = "Runs per-tenant telemetry collection jobs on a schedule")]
struct CliArgs {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted.
    Run(RunArgs),
    /// List the available job codes.
    Jobs,
    /// Process a single tenant request read from stdin (used by process mode).
    #[clap(hide = true)]
    Worker,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Job code to run every cycle. Repeat for several jobs.
    #[clap(long = "job")]
    pub jobs: Vec<String>,

    /// Seconds to wait between cycles.
    #[clap(long, default_value_t = 300)]
    pub interval_secs: u64,

    /// Where tenant invocations run.
    #[clap(long, value_enum, default_value_t = ExecutionModeKind::Threaded)]
    pub execution_mode: ExecutionModeKind,

    /// Maximum concurrent worker processes in process mode.
    #[clap(long, default_value_t = 4)]
    pub workers: usize,

    /// Seconds a running worker may continue after a stop before it is killed.
    #[clap(long, default_value_t = 30)]
    pub worker_shutdown_grace_secs: u64,

    /// Identity endpoint issuing client-credentials tokens.
    #[clap(long)]
    pub token_url: Option<String>,

    /// Base URL of the telemetry API.
    #[clap(long)]
    pub api_base_url: Option<String>,

    /// Timeout in seconds for identity and telemetry requests.
    #[clap(long, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Seconds subtracted from each token lifetime before caching it.
    #[clap(long, default_value_t = DEFAULT_SAFETY_MARGIN_SECS)]
    pub token_safety_margin_secs: u64,

    /// Attempts per remote call, the first one included.
    #[clap(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Base backoff delay in seconds.
    #[clap(long, default_value_t = 2)]
    pub base_delay_secs: u64,

    /// SQLite token cache shared by worker processes. Required in process mode.
    #[clap(long, value_parser = parse_path)]
    pub token_cache_path: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping). Disabled when unset.
    #[clap(long)]
    pub metrics_port: Option<u16>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&RunArgs> for config::CliConfig {
    fn from(args: &RunArgs) -> Self {
        config::CliConfig {
            jobs: args.jobs.clone(),
            interval_secs: args.interval_secs,
            execution_mode: args.execution_mode,
            workers: args.workers,
            worker_shutdown_grace_secs: args.worker_shutdown_grace_secs,
            token_url: args.token_url.clone(),
            api_base_url: args.api_base_url.clone(),
            request_timeout_secs: args.request_timeout_secs,
            token_safety_margin_secs: args.token_safety_margin_secs,
            max_attempts: args.max_attempts,
            base_delay_secs: args.base_delay_secs,
            token_cache_path: args.token_cache_path.clone(),
            metrics_port: args.metrics_port,
        }
    }
}

fn init_tracing(to_stderr: bool) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LOG_LEVEL")
        .from_env_lossy();

    // Workers keep stdout for their reply
    let result = if to_stderr {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .try_init()
    };
    result.context("Failed to initialize logging")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli_args = CliArgs::parse();

    match cli_args.command {
        Command::Run(args) => {
            init_tracing(false)?;
            run(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Jobs => {
            for descriptor in JobRegistry::with_builtin_jobs().descriptors() {
                println!("{:<16} {}", descriptor.code, descriptor.name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Worker => {
            init_tracing(true)?;
            worker().await
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    info!("telemetry-scheduler {}", VERSION);

    // Load TOML config if provided
    let file_config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  jobs: {:?}", app_config.jobs);
    info!("  interval: {:?}", app_config.interval);
    info!("  execution mode: {:?}", app_config.execution_mode);
    info!("  api_base_url: {}", app_config.api_base_url);
    info!("  tenants: {}", app_config.tenants.len());

    info!("Initializing metrics...");
    metrics::init_metrics();

    let cache: Arc<dyn TokenCache> = match &app_config.token_cache_path {
        Some(path) => {
            info!("Opening token cache at {:?}", path);
            Arc::new(SqliteTokenCache::open(path)?)
        }
        None => Arc::new(InMemoryTokenCache::new()),
    };
    let issuer = HttpCredentialIssuer::new(app_config.token_url.clone(), app_config.request_timeout)?;
    let broker = Arc::new(CredentialBroker::new(
        cache,
        Arc::new(issuer),
        app_config.token_safety_margin,
    ));

    let shutdown_token = CancellationToken::new();
    let context = TenantContext::new(
        broker,
        app_config.remote_settings(),
        app_config.retry_policy.clone(),
        Arc::new(TokioBackoff),
        shutdown_token.clone(),
    )?;

    let runner = match app_config.execution_mode {
        ExecutionMode::Threaded => JobRunner::threaded(context),
        ExecutionMode::Process { workers } => {
            let program =
                std::env::current_exe().context("Failed to locate the scheduler executable")?;
            let pool = ProcessWorkerPool::new(
                program,
                app_config.worker_settings()?,
                workers,
                app_config.worker_shutdown_grace,
            );
            JobRunner::with_worker_pool(context, pool)
        }
    };

    if app_config.tenants.is_empty() {
        warn!("No tenants configured, cycles will be empty");
    }
    let directory: Arc<dyn TenantDirectory> =
        Arc::new(StaticTenantDirectory::new(app_config.tenants.clone())?);

    let scheduler = Scheduler::new(
        app_config.scheduler_config(),
        Arc::new(JobRegistry::with_builtin_jobs()),
        directory,
        Arc::new(runner),
    );

    let metrics_task = app_config.metrics_port.map(|port| {
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::serve_metrics(port, token).await {
                error!("Metrics server error: {:#}", e);
            }
        })
    });

    tokio::spawn(stop_on_signal(scheduler.handle()));

    let cycles = scheduler.run().await?;
    info!("Scheduler finished after {} cycles", cycles);

    shutdown_token.cancel();
    if let Some(task) = metrics_task {
        let _ = task.await;
    }
    Ok(())
}

async fn stop_on_signal(handle: SchedulerHandle) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Received Ctrl-C, stopping scheduler...");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping scheduler...");
        }
    }
    handle.stop();
}

async fn worker() -> Result<ExitCode> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read worker request")?;
    let request: WorkerRequest =
        serde_json::from_slice(&input).context("Failed to parse worker request")?;
    info!(
        "Worker {} running {} for tenant {}",
        std::process::id(),
        request.job_code,
        request.tenant.id
    );

    let cancellation_token = CancellationToken::new();
    let signal_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let reply = execute_worker_request(
        request,
        &JobRegistry::with_builtin_jobs(),
        cancellation_token,
    )
    .await;
    println!(
        "{}",
        serde_json::to_string(&reply).context("Failed to encode worker reply")?
    );

    Ok(match reply {
        WorkerReply::Succeeded { .. } => ExitCode::SUCCESS,
        WorkerReply::Failed { error } => {
            error!("Worker failed: {}", error);
            ExitCode::FAILURE
        }
    })
}
