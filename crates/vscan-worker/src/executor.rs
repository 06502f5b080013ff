//! Redis Streams job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vscan_queue::{JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::ProcessingPipeline;

/// Consumes pipeline jobs from the queue and runs them.
///
/// A job is acknowledged whenever the pipeline returns, whatever the stage
/// outcomes. Only orchestration errors count as failed deliveries; retryable
/// ones are left pending for redelivery until the retry budget runs out, the
/// rest go straight to the DLQ.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<ProcessingPipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, pipeline: Arc<ProcessingPipeline>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            pipeline,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`JobExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.queue.init().await?;

        let claim_task = self.spawn_claimer();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running at shutdown; they will be reclaimed");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over jobs left pending by crashed consumers.
    fn spawn_claimer(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let jobs = match queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(jobs) => jobs,
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                                continue;
                            }
                        };
                        if !jobs.is_empty() {
                            info!(count = jobs.len(), "Claimed pending jobs");
                        }
                        for (message_id, job) in jobs {
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                return;
                            };
                            let queue = Arc::clone(&queue);
                            let pipeline = Arc::clone(&pipeline);
                            tokio::spawn(async move {
                                let _permit = permit;
                                Self::execute_job(pipeline, queue, message_id, job).await;
                            });
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }
        debug!(count = jobs.len(), "Consumed jobs from queue");

        for (message_id, job) in jobs {
            let queue = Arc::clone(&self.queue);
            let pipeline = Arc::clone(&self.pipeline);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::orchestration("job semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(pipeline, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    async fn execute_job(
        pipeline: Arc<ProcessingPipeline>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let job_id = job.job_id().clone();
        info!(job_id = %job_id, video_id = %job.video_id(), "Executing job");

        let result = match &job {
            QueueJob::ProcessVideo(j) => pipeline.execute(j).await,
        };

        let error = match result {
            Ok(status) => {
                info!(job_id = %job_id, %status, "Job completed");
                if let Err(e) = queue.ack(&message_id, &job).await {
                    error!(job_id = %job_id, "Failed to ack job: {}", e);
                }
                return;
            }
            Err(e) => e,
        };

        error!(job_id = %job_id, "Job failed: {}", error);

        let retry_count = if error.is_retryable() {
            queue.increment_retry(&message_id).await.unwrap_or(u32::MAX)
        } else {
            u32::MAX
        };
        let max_retries = queue.max_retries();

        if retry_count >= max_retries {
            warn!(job_id = %job_id, retry_count, max_retries, "Moving job to DLQ");
            metrics::record_dead_letter();
            if let Err(dlq_err) = queue.dlq(&message_id, &job, &error.to_string()).await {
                error!(job_id = %job_id, "Failed to move job to DLQ: {}", dlq_err);
            }
        } else {
            info!(
                job_id = %job_id,
                attempt = retry_count,
                max_retries,
                "Job will be redelivered after the visibility timeout"
            );
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
