//! vscan worker binary.
//!
//! With `TASK_RUNNER=redis` it consumes jobs from the queue until ctrl-c.
//! With the local runner it processes the video paths given as arguments
//! and prints each final record as JSON.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vscan_models::{SubmitVideoRequest, VideoId};
use vscan_queue::JobQueue;
use vscan_worker::{JobExecutor, LocalTaskRunner, RunnerKind, WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Already installed is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting vscan-worker");

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    info!("Worker config: {:?}", config);

    let ctx = WorkerContext::from_config(config.clone())
        .await
        .context("failed to build worker context")?;

    match config.task_runner {
        RunnerKind::Redis => run_executor(config, &ctx).await,
        RunnerKind::Local => run_local(config, &ctx, std::env::args().skip(1).collect()).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vscan=info".parse()?)
        .add_directive("hyper=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run_executor(config: WorkerConfig, ctx: &WorkerContext) -> anyhow::Result<()> {
    let queue = Arc::new(JobQueue::from_env().context("failed to create job queue")?);
    let executor = Arc::new(JobExecutor::new(config, queue, Arc::clone(&ctx.pipeline)));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        return Err(e.into());
    }

    info!("Worker shutdown complete");
    Ok(())
}

async fn run_local(config: WorkerConfig, ctx: &WorkerContext, files: Vec<String>) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no input files; pass video paths or set TASK_RUNNER=redis");
    }

    let runner = Arc::new(LocalTaskRunner::new(
        Arc::clone(&ctx.pipeline),
        config.max_concurrent_jobs,
    ));
    let service = ctx.service(runner.clone());

    let mut submitted: Vec<VideoId> = Vec::new();
    for file in files {
        match service.submit(SubmitVideoRequest::new(&file)).await {
            Ok(id) => submitted.push(id),
            Err(e) => error!(path = %file, "Rejected: {}", e),
        }
    }

    tokio::select! {
        _ = runner.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            info!(in_flight = runner.in_flight(), "Interrupted");
            return Ok(());
        }
    }

    for id in submitted {
        let record = service.get_status(&id).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}
