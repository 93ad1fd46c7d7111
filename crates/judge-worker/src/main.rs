use clap::Parser;
use judge_core::sandbox::DockerRuntime;
use judge_core::{queue::QueueClient, recorder::SubmissionRecorder, worker};
use tracing_subscriber::EnvFilter;

/// Poll the execution queue, adjudicate submissions in Docker sandboxes,
/// and persist results.
#[derive(Parser, Debug)]
#[command(name = "judge-worker", about = "Execution worker: polls the queue, adjudicates submissions, persists results")]
struct Args {
    /// Claim and process exactly one job, then exit. For local testing
    /// without a full daemon.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = judge_core::WorkerConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = DockerRuntime::connect().map_err(|e| anyhow::anyhow!("failed to connect to container daemon: {e}"))?;

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let mut queue = QueueClient::new(redis_conn.clone());

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let mut recorder = SubmissionRecorder::new(pg_pool, redis_conn);

    let shutdown = worker::install_shutdown_handler();

    if args.once {
        match queue.claim().await? {
            Some(job) => {
                tracing::info!(job_id = %job.job_id, "processing single job (--once)");
                let submission_id = job.payload.submission_id.clone();
                recorder.mark_running(&submission_id).await?;
                let exec_config = config.execution_config();
                let result = judge_core::adjudicate(
                    &runtime,
                    &submission_id,
                    &job.payload.language,
                    &job.payload.code,
                    &job.payload.test_cases,
                    &exec_config,
                )
                .await;
                recorder.record_result(&result).await?;
                queue.complete(&job).await?;
            }
            None => tracing::info!("no job available"),
        }
        return Ok(());
    }

    worker::run(&runtime, &mut queue, &mut recorder, &config, shutdown).await?;
    Ok(())
}
