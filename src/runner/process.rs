//! Worker-process execution.
//!
//! The parent spawns `<program> worker` once per tenant, writes a
//! [`WorkerRequest`] as JSON on the child's stdin and reads a [`WorkerReply`]
//! from its stdout. Workers share credentials through the SQLite token cache.

use super::TenantOutcome;
use crate::auth::{CredentialBroker, HttpCredentialIssuer};
use crate::jobs::{JobParams, JobRegistry, JobSummary, TenantContext};
use crate::remote::{RemoteSettings, RetryPolicy, TokioBackoff};
use crate::tenants::Tenant;
use crate::token_cache::SqliteTokenCache;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a worker needs to rebuild its side of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub token_url: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub token_safety_margin_secs: u64,
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub token_cache_path: PathBuf,
    pub job_params: JobParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job_code: String,
    pub tenant: Tenant,
    pub settings: WorkerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Succeeded { summary: JobSummary },
    Failed { error: String },
}

/// Runs one tenant invocation inside a worker process.
///
/// Never fails: every error becomes [`WorkerReply::Failed`].
pub async fn execute_worker_request(
    request: WorkerRequest,
    registry: &JobRegistry,
    cancellation_token: CancellationToken,
) -> WorkerReply {
    match execute(request, registry, cancellation_token).await {
        Ok(summary) => WorkerReply::Succeeded { summary },
        Err(e) => WorkerReply::Failed {
            error: format!("{:#}", e),
        },
    }
}

async fn execute(
    request: WorkerRequest,
    registry: &JobRegistry,
    cancellation_token: CancellationToken,
) -> Result<JobSummary> {
    let settings = request.settings;
    let job = registry.lookup(&request.job_code)?.instantiate(&settings.job_params);

    let timeout = Duration::from_secs(settings.request_timeout_secs);
    let cache = SqliteTokenCache::open(&settings.token_cache_path)?;
    let issuer = HttpCredentialIssuer::new(settings.token_url.clone(), timeout)?;
    let broker = Arc::new(CredentialBroker::new(
        Arc::new(cache),
        Arc::new(issuer),
        Duration::from_secs(settings.token_safety_margin_secs),
    ));
    let context = TenantContext::new(
        broker,
        RemoteSettings::new(settings.api_base_url.clone(), timeout),
        RetryPolicy::new(
            settings.max_attempts,
            Duration::from_secs(settings.base_delay_secs),
        ),
        Arc::new(TokioBackoff),
        cancellation_token,
    )?;

    let summary = job.process_tenant(&request.tenant, &context).await?;
    Ok(summary)
}

/// Bounded pool of worker processes.
pub struct ProcessWorkerPool {
    program: PathBuf,
    settings: WorkerSettings,
    permits: Arc<Semaphore>,
    workers: usize,
    shutdown_grace: Duration,
}

impl ProcessWorkerPool {
    pub fn new(
        program: PathBuf,
        settings: WorkerSettings,
        workers: usize,
        shutdown_grace: Duration,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            program,
            settings,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            shutdown_grace,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs one tenant in a child process once a worker slot is free.
    ///
    /// Skipped if stop is requested while queued. A running child gets the
    /// grace period after stop, then is killed.
    pub async fn run_tenant(
        &self,
        job_code: &str,
        tenant: &Tenant,
        cancellation_token: &CancellationToken,
    ) -> TenantOutcome {
        let _permit = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => return TenantOutcome::Skipped,
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return TenantOutcome::Failed("worker pool closed".to_string()),
            },
        };

        let request = WorkerRequest {
            job_code: job_code.to_string(),
            tenant: tenant.clone(),
            settings: self.settings.clone(),
        };
        match self.spawn_worker(&request, cancellation_token).await {
            Ok(summary) => TenantOutcome::Succeeded(summary),
            Err(e) => TenantOutcome::Failed(format!("{:#}", e)),
        }
    }

    async fn spawn_worker(
        &self,
        request: &WorkerRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<JobSummary> {
        let payload = serde_json::to_vec(request).context("Failed to encode worker request")?;

        let mut child = Command::new(&self.program)
            .arg("worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker {}", self.program.display()))?;
        debug!(
            "[{}] worker {:?} started for {}",
            request.tenant.id,
            child.id(),
            request.job_code
        );

        let mut stdin = child.stdin.take().context("Worker stdin unavailable")?;
        stdin
            .write_all(&payload)
            .await
            .context("Failed to send request to worker")?;
        drop(stdin);

        let mut stdout = child.stdout.take().context("Worker stdout unavailable")?;
        let reader = tokio::spawn(async move {
            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await.map(|_| output)
        });

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = grace_expired(cancellation_token, self.shutdown_grace) => None,
        };
        let status = match exited {
            Some(status) => status.context("Failed to wait for worker")?,
            None => {
                warn!(
                    "[{}] worker still running {:?} after stop, killing it",
                    request.tenant.id, self.shutdown_grace
                );
                child.kill().await.context("Failed to kill worker")?;
                bail!("worker killed after shutdown grace period");
            }
        };

        let output = reader
            .await
            .context("Worker output reader panicked")?
            .context("Failed to read worker output")?;
        let reply: Option<WorkerReply> = serde_json::from_slice(&output).ok();

        match reply {
            Some(WorkerReply::Succeeded { summary }) if status.success() => Ok(summary),
            Some(WorkerReply::Failed { error }) => bail!("{}", error),
            _ if !status.success() => bail!("worker exited with {}", status),
            _ => bail!("worker produced no summary"),
        }
    }
}

async fn grace_expired(cancellation_token: &CancellationToken, grace: Duration) {
    cancellation_token.cancelled().await;
    tokio::time::sleep(grace).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            token_url: "http://127.0.0.1:9/oauth2/token".to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            token_safety_margin_secs: 60,
            max_attempts: 1,
            base_delay_secs: 0,
            token_cache_path: PathBuf::from("/tmp/unused.db"),
            job_params: JobParams::default(),
        }
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = WorkerReply::Succeeded {
            summary: JobSummary::new(3, "hosts"),
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"status": "succeeded", "summary": {"items": 3, "detail": "hosts"}})
        );

        let failed: WorkerReply =
            serde_json::from_value(json!({"status": "failed", "error": "boom"})).unwrap();
        assert_eq!(
            failed,
            WorkerReply::Failed {
                error: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_reported_as_failure() {
        let request = WorkerRequest {
            job_code: "RF-000".to_string(),
            tenant: Tenant::new("t1", "T1", "id", "secret"),
            settings: settings(),
        };
        let reply = execute_worker_request(
            request,
            &JobRegistry::with_builtin_jobs(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(reply, WorkerReply::Failed { error } if error.contains("RF-000")));
    }

    #[tokio::test]
    async fn test_queued_tenant_skipped_after_stop() {
        let pool = ProcessWorkerPool::new(
            PathBuf::from("/nonexistent/worker"),
            settings(),
            1,
            Duration::from_secs(1),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = pool
            .run_tenant("RF-015", &Tenant::new("t1", "T1", "id", "s"), &cancel)
            .await;
        assert_eq!(outcome, TenantOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_missing_program_is_a_tenant_failure() {
        let pool = ProcessWorkerPool::new(
            PathBuf::from("/nonexistent/worker"),
            settings(),
            0,
            Duration::from_secs(1),
        );
        assert_eq!(pool.workers(), 1);

        let outcome = pool
            .run_tenant(
                "RF-015",
                &Tenant::new("t1", "T1", "id", "s"),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(outcome, TenantOutcome::Failed(msg) if msg.contains("spawn")));
    }
}
