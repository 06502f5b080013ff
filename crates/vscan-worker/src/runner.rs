//! Background task runners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info};
use vscan_queue::{JobQueue, ProcessVideoJob};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::ProcessingPipeline;

/// Fire-and-forget job submission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Hand the job off; returns once it is accepted, not when it finishes.
    async fn enqueue(&self, job: ProcessVideoJob) -> WorkerResult<()>;

    fn name(&self) -> &'static str;
}

/// Runs jobs as tokio tasks in this process, at most `max_concurrent` at a time.
pub struct LocalTaskRunner {
    pipeline: Arc<ProcessingPipeline>,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl LocalTaskRunner {
    pub fn new(pipeline: Arc<ProcessingPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Jobs accepted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every accepted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl TaskRunner for LocalTaskRunner {
    async fn enqueue(&self, job: ProcessVideoJob) -> WorkerResult<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        let idle = Arc::clone(&self.idle);

        in_flight.fetch_add(1, Ordering::SeqCst);
        debug!(job_id = %job.job_id, video_id = %job.video_id, "Job accepted");

        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => match pipeline.execute(&job).await {
                    Ok(status) => {
                        info!(job_id = %job.job_id, video_id = %job.video_id, %status, "Job finished")
                    }
                    Err(e) => {
                        error!(job_id = %job.job_id, video_id = %job.video_id, "Job failed: {}", e)
                    }
                },
                Err(_) => error!(job_id = %job.job_id, "Runner closed before job started"),
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });

        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Publishes jobs to the Redis stream consumed by [`crate::JobExecutor`].
pub struct QueueTaskRunner {
    queue: Arc<JobQueue>,
}

impl QueueTaskRunner {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl TaskRunner for QueueTaskRunner {
    async fn enqueue(&self, job: ProcessVideoJob) -> WorkerResult<()> {
        match self.queue.enqueue(job).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Err(WorkerError::validation(format!(
                "a run for this video is already queued ({})",
                e
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
