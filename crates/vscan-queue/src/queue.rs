//! Pipeline job queue on Redis Streams.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::streams::StreamId;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    pub stream_name: String,
    pub consumer_group: String,
    pub dlq_stream_name: String,
    /// Deliveries before a job is dead-lettered
    pub max_retries: u32,
    /// Idle time after which another worker may claim a pending job.
    /// Also the lifetime of the dedup marker.
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vscan:jobs".to_string(),
            consumer_group: "vscan:workers".to_string(),
            dlq_stream_name: "vscan:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(900),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.stream_name, idempotency_key)
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.stream_name, message_id)
    }
}

/// Redis Streams job queue with a consumer group, dedup markers and a DLQ.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group (and stream) if missing.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Add a job to the stream. Returns the stream message id.
    ///
    /// Fails with [`QueueError::Duplicate`] while an earlier job with the same
    /// idempotency key is still pending.
    pub async fn enqueue(&self, job: impl Into<QueueJob>) -> QueueResult<String> {
        let job = job.into();
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = self.config.dedup_key(&idempotency_key);

        // SET NX claims the key atomically; a nil reply means it was taken.
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(job.job_id().as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.config.visibility_timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            warn!(key = %idempotency_key, "Duplicate job rejected");
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                let _: Result<(), _> = conn.del(&dedup_key).await;
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!(
            job_id = %job.job_id(),
            video_id = %job.video_id(),
            message_id = %message_id,
            "Enqueued job"
        );
        Ok(message_id)
    }

    /// Acknowledge and delete a finished message, releasing its dedup marker.
    pub async fn ack(&self, message_id: &str, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        self.ack_message(&mut conn, message_id).await?;

        let dedup_key = self.config.dedup_key(&job.idempotency_key());
        let retry_key = self.config.retry_key(message_id);
        conn.del::<_, ()>(vec![dedup_key, retry_key]).await?;

        debug!(message_id, job_id = %job.job_id(), "Acknowledged job");
        Ok(())
    }

    async fn ack_message(&self, conn: &mut MultiplexedConnection, message_id: &str) -> QueueResult<()> {
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    /// Copy a job to the dead letter stream and acknowledge the original.
    pub async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id, job).await?;

        warn!(job_id = %job.job_id(), error, "Moved job to DLQ");
        Ok(())
    }

    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    /// Read new messages for this consumer, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.conn().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply.keys.into_iter().flat_map(|k| k.ids);
        self.decode_entries(&mut conn, entries).await
    }

    /// Take over messages another consumer left idle for `min_idle_ms`.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.conn().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;
        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let jobs = self.decode_entries(&mut conn, reply.claimed).await?;
        for (_, job) in &jobs {
            info!(job_id = %job.job_id(), "Claimed pending job");
        }
        Ok(jobs)
    }

    /// Malformed payloads are acknowledged and dropped.
    async fn decode_entries(
        &self,
        conn: &mut MultiplexedConnection,
        entries: impl IntoIterator<Item = StreamId>,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut jobs = Vec::new();

        for entry in entries {
            let decoded = match entry.map.get("job") {
                Some(redis::Value::BulkString(payload)) => serde_json::from_slice::<QueueJob>(payload),
                _ => {
                    warn!(message_id = %entry.id, "Stream entry has no job payload");
                    self.ack_message(conn, &entry.id).await.ok();
                    continue;
                }
            };

            match decoded {
                Ok(job) => {
                    debug!(job_id = %job.job_id(), message_id = %entry.id, "Consumed job");
                    jobs.push((entry.id, job));
                }
                Err(e) => {
                    warn!(message_id = %entry.id, "Failed to parse job payload: {}", e);
                    self.ack_message(conn, &entry.id).await.ok();
                }
            }
        }

        Ok(jobs)
    }

    pub async fn retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let count: Option<u32> = conn.get(self.config.retry_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Bump the failure count of a message; the counter expires after a day.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let key = self.config.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86_400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
