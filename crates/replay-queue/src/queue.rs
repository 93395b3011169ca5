//! Job intake from a Redis Streams consumer group.

use std::collections::HashMap;
use std::time::Duration;

use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use tracing::{debug, info, warn};

use replay_models::ExportJob;

use crate::error::{QueueError, QueueResult};

/// Cursor that starts an XAUTOCLAIM scan, and the value it returns when the scan is done.
pub const CURSOR_START: &str = "0-0";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream jobs are read from
    pub request_stream: String,
    /// Stream progress events are written to
    pub progress_stream: String,
    /// Stream terminal results are written to
    pub result_stream: String,
    /// Consumer group name
    pub consumer_group: String,
    /// This worker's consumer name within the group
    pub consumer_name: String,
    /// How long a read waits for a new entry
    pub block_timeout: Duration,
    /// Minimum idle time before another consumer's entry may be claimed.
    /// At zero, recovery also takes over entries a live peer is still working on.
    pub claim_min_idle: Duration,
    /// Entries claimed per XAUTOCLAIM page
    pub claim_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            request_stream: "job.requests".to_string(),
            progress_stream: "job.progress".to_string(),
            result_stream: "job.results".to_string(),
            consumer_group: "replay-jobs".to_string(),
            consumer_name: "replay-worker".to_string(),
            block_timeout: Duration::from_millis(5000),
            claim_min_idle: Duration::ZERO,
            claim_batch: 10,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    ///
    /// `REDIS_URL` wins over `REDIS_HOST`/`REDIS_PORT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| {
            let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "redis".to_string());
            let port = std::env::var("REDIS_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(6379);
            format!("redis://{}:{}", host, port)
        });

        Self {
            redis_url,
            request_stream: std::env::var("JOB_QUEUE_REQUEST_STREAM")
                .unwrap_or(defaults.request_stream),
            progress_stream: std::env::var("JOB_QUEUE_PROGRESS_STREAM")
                .unwrap_or(defaults.progress_stream),
            result_stream: std::env::var("JOB_QUEUE_RESULT_STREAM")
                .unwrap_or(defaults.result_stream),
            consumer_group: std::env::var("JOB_QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            consumer_name: std::env::var("WORKER_ID").unwrap_or(defaults.consumer_name),
            block_timeout: std::env::var("QUEUE_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.block_timeout),
            claim_min_idle: std::env::var("QUEUE_CLAIM_MIN_IDLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.claim_min_idle),
            claim_batch: std::env::var("QUEUE_CLAIM_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.claim_batch),
        }
    }
}

/// One entry read from the request stream, with its fields decoded as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream entry ID (e.g. "1700000000000-0")
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    fn from_stream_id(entry: StreamId) -> Self {
        let fields = entry
            .map
            .iter()
            .filter_map(|(key, value)| {
                redis::from_redis_value::<String>(value)
                    .ok()
                    .map(|v| (key.clone(), v))
            })
            .collect();
        Self {
            id: entry.id,
            fields,
        }
    }
}

/// One page of an XAUTOCLAIM scan.
#[derive(Debug, Clone, Default)]
pub struct ClaimBatch {
    /// Cursor for the next page; [`CURSOR_START`] once the scan is complete
    pub next_cursor: String,
    pub entries: Vec<StreamEntry>,
    /// Pending IDs whose entries no longer exist in the stream
    pub deleted_ids: Vec<String>,
}

impl ClaimBatch {
    pub fn is_last_page(&self) -> bool {
        self.next_cursor == CURSOR_START || self.next_cursor.is_empty()
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Check that Redis answers.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Create the consumer group if it does not exist yet.
    ///
    /// The group starts at the beginning of the stream so requests written
    /// before the first worker came up are still delivered.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.request_stream)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Append a job to the request stream. Returns the entry ID.
    pub async fn enqueue(&self, job: &ExportJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.config.request_stream).arg("*");
        for (key, value) in job.to_fields() {
            cmd.arg(key).arg(value);
        }
        let message_id: String = cmd.query_async(&mut conn).await?;

        info!("Enqueued job {} with message ID {}", job.job_id, message_id);
        Ok(message_id)
    }

    /// Block up to the configured timeout for entries never delivered to the group.
    ///
    /// An empty result means the read timed out.
    pub async fn consume(&self, count: usize) -> QueueResult<Vec<StreamEntry>> {
        self.read_group(">", count, Some(self.config.block_timeout)).await
    }

    /// Claim one page of entries left pending by any consumer in the group.
    pub async fn claim_pending(&self, cursor: &str) -> QueueResult<ClaimBatch> {
        let mut conn = self.connection().await?;

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.request_stream)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(self.config.claim_min_idle.as_millis() as u64)
            .arg(cursor)
            .arg("COUNT")
            .arg(self.config.claim_batch)
            .query_async(&mut conn)
            .await?;

        let entries: Vec<StreamEntry> = reply
            .claimed
            .into_iter()
            .map(StreamEntry::from_stream_id)
            .collect();
        if !entries.is_empty() {
            info!(count = entries.len(), "Claimed pending entries");
        }

        Ok(ClaimBatch {
            next_cursor: reply.next_stream_id,
            entries,
            deleted_ids: reply.deleted_ids,
        })
    }

    /// Entries already delivered to this consumer but not acknowledged.
    ///
    /// Used when XAUTOCLAIM is unavailable; it cannot take over other consumers' entries.
    pub async fn own_pending(&self) -> QueueResult<Vec<StreamEntry>> {
        self.read_group("0", self.config.claim_batch, None).await
    }

    async fn read_group(
        &self,
        start: &str,
        count: usize,
        block: Option<Duration>,
    ) -> QueueResult<Vec<StreamEntry>> {
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(count);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(&self.config.request_stream).arg(start);

        let reply: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;

        let entries: Vec<StreamEntry> = reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .map(StreamEntry::from_stream_id)
            .collect();
        for entry in &entries {
            debug!("Read entry {} from {}", entry.id, self.config.request_stream);
        }
        Ok(entries)
    }

    /// Acknowledge an entry. It stays in the stream; only the pending record is cleared.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let acked: u64 = redis::cmd("XACK")
            .arg(&self.config.request_stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;

        if acked == 0 {
            warn!("Entry {} was not pending when acknowledged", message_id);
        } else {
            debug!("Acknowledged entry: {}", message_id);
        }
        Ok(())
    }

    /// Number of entries pending in the group.
    pub async fn pending_count(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let reply: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.request_stream)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;
        Ok(reply.count() as u64)
    }
}
