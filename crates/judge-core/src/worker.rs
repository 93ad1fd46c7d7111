//! Worker loop — ties the queue client, execution engine/adjudicator, and
//! submission recorder together into the long-running process.
//!
//! Sequence, grounded on original_source's `run_worker`:
//! 1. Install signal handlers.
//! 2. Ping the container daemon; exit immediately if unreachable.
//! 3. Reap any sandboxes left over from a previous crash.
//! 4. Connect to the queue store and relational store.
//! 5. Loop: claim a job, process it, adapt the poll interval; on no job,
//!    back off (multiplicatively, capped) before polling again.
//! 6. On shutdown signal, finish any in-flight job, then reap orphans once
//!    more and exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::adjudicate::adjudicate;
use crate::error::JudgeError;
use crate::queue::{ClaimedJob, QueueClient};
use crate::recorder::SubmissionRecorder;
use crate::sandbox::ContainerRuntime;
use crate::types::ExecutionConfig;

const CONTAINER_PREFIX_DEFAULT: &str = "codearena-exec";
const WORKER_CONCURRENCY_DEFAULT: u32 = 3;
const EXECUTION_TIMEOUT_MS_DEFAULT: u64 = 10_000;
const MAX_MEMORY_MB_DEFAULT: u64 = 256;
const LOG_LEVEL_DEFAULT: &str = "info";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);
const BACKOFF_FACTOR: f64 = 1.5;
const STORE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Worker process configuration, assembled once at startup from the
/// environment and held read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: String,
    pub worker_concurrency: u32,
    pub execution_timeout_ms: u64,
    pub max_memory_mb: u64,
    pub container_prefix: String,
    pub log_level: String,
}

impl WorkerConfig {
    /// Read configuration from the environment. `DATABASE_URL` and
    /// `REDIS_URL` are required and fail fast if absent or malformed; the
    /// remaining numeric tuning knobs fall back to the same defaults
    /// original_source used.
    pub fn from_env() -> Result<Self, JudgeError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| JudgeError::Config("DATABASE_URL is required".to_string()))?;
        let redis_url = std::env::var("REDIS_URL")
            .map_err(|_| JudgeError::Config("REDIS_URL is required".to_string()))?;

        let worker_concurrency = parse_env_or("WORKER_CONCURRENCY", WORKER_CONCURRENCY_DEFAULT)?;
        let execution_timeout_ms = parse_env_or("EXECUTION_TIMEOUT_MS", EXECUTION_TIMEOUT_MS_DEFAULT)?;
        let max_memory_mb = parse_env_or("MAX_MEMORY_MB", MAX_MEMORY_MB_DEFAULT)?;
        let container_prefix =
            std::env::var("CONTAINER_PREFIX").unwrap_or_else(|_| CONTAINER_PREFIX_DEFAULT.to_string());
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| LOG_LEVEL_DEFAULT.to_string());

        if worker_concurrency > 1 {
            warn!(
                worker_concurrency,
                "WORKER_CONCURRENCY > 1 is accepted but not yet acted on; the reference loop processes one job at a time"
            );
        }

        Ok(Self {
            database_url,
            redis_url,
            worker_concurrency,
            execution_timeout_ms,
            max_memory_mb,
            container_prefix,
            log_level,
        })
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        let limit = format!("{}m", self.max_memory_mb);
        ExecutionConfig {
            memory_limit: limit.clone(),
            memory_swap: limit,
            timeout: Duration::from_millis(self.execution_timeout_ms),
            container_prefix: self.container_prefix.clone(),
            ..ExecutionConfig::default()
        }
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, JudgeError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| JudgeError::Config(format!("{key} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Install `SIGINT`/`SIGTERM` handlers that flip `shutdown` to `true`. Spawns
/// a background task; the returned `JoinHandle` is intentionally dropped by
/// callers — the task runs for the lifetime of the process.
pub fn install_shutdown_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = terminate.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received ctrl-c");
        }
        flag.store(true, Ordering::SeqCst);
    });
    shutdown
}

/// Run the poll/process loop until `shutdown` is set. Reaps orphaned
/// sandboxes from a previous run before the loop starts and once more after
/// it exits.
pub async fn run<R: ContainerRuntime>(
    runtime: &R,
    queue: &mut QueueClient,
    recorder: &mut SubmissionRecorder,
    config: &WorkerConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<(), JudgeError> {
    if !runtime.ping().await {
        return Err(JudgeError::DaemonUnreachable(
            "container daemon did not respond to ping at startup".to_string(),
        ));
    }

    reap_orphans(runtime, &config.container_prefix).await;

    info!(
        concurrency = config.worker_concurrency,
        timeout_ms = config.execution_timeout_ms,
        max_memory_mb = config.max_memory_mb,
        "worker ready, waiting for jobs"
    );

    let mut poll_interval = MIN_POLL_INTERVAL;

    while !shutdown.load(Ordering::SeqCst) {
        match queue.claim().await {
            Ok(Some(job)) => {
                process_job(runtime, queue, recorder, config, job).await;
                poll_interval = MIN_POLL_INTERVAL;
            }
            Ok(None) => {
                tokio::time::sleep(poll_interval).await;
                poll_interval = Duration::from_secs_f64((poll_interval.as_secs_f64() * BACKOFF_FACTOR).min(MAX_POLL_INTERVAL.as_secs_f64()));
            }
            Err(JudgeError::Queue(e)) => {
                error!(error = %e, "queue store error, backing off");
                tokio::time::sleep(STORE_ERROR_BACKOFF).await;
            }
            Err(e) => {
                error!(error = %e, "unexpected error claiming job");
                tokio::time::sleep(MIN_POLL_INTERVAL).await;
            }
        }
    }

    info!("shutdown requested, draining in-flight work and exiting");
    reap_orphans(runtime, &config.container_prefix).await;
    Ok(())
}

async fn process_job<R: ContainerRuntime>(
    runtime: &R,
    queue: &mut QueueClient,
    recorder: &mut SubmissionRecorder,
    config: &WorkerConfig,
    job: ClaimedJob,
) {
    let submission_id = job.payload.submission_id.clone();
    info!(job_id = %job.job_id, submission_id, language = %job.payload.language, "processing job");

    if let Err(e) = recorder.mark_running(&submission_id).await {
        error!(job_id = %job.job_id, submission_id, error = %e, "failed to mark submission running");
    }

    let exec_config = config.execution_config();
    let result = adjudicate(
        runtime,
        &submission_id,
        &job.payload.language,
        &job.payload.code,
        &job.payload.test_cases,
        &exec_config,
    )
    .await;

    match recorder.record_result(&result).await {
        Ok(()) => {
            if let Err(e) = queue.complete(&job).await {
                error!(job_id = %job.job_id, error = %e, "failed to mark job complete in queue");
            }
        }
        Err(e) => {
            error!(job_id = %job.job_id, submission_id, error = %e, "failed to record submission result");
            if let Err(e) = queue.fail(&job, &e.to_string()).await {
                error!(job_id = %job.job_id, error = %e, "failed to mark job failed in queue");
            }
        }
    }

    info!(job_id = %job.job_id, submission_id, verdict = result.verdict.human(), "job completed");
}

async fn reap_orphans<R: ContainerRuntime>(runtime: &R, prefix: &str) {
    let orphans = runtime.list_by_prefix(prefix).await;
    if orphans.is_empty() {
        return;
    }
    info!(count = orphans.len(), "reaping orphaned sandboxes from a previous run");
    for name in orphans {
        runtime
            .destroy(&crate::sandbox::SandboxHandle { id: name.clone(), name })
            .await;
    }
}
