//! Progress and result events written to their own streams.

use tracing::debug;

use replay_models::{JobResult, ProgressEvent};

use crate::error::{QueueError, QueueResult};
use crate::queue::QueueConfig;

/// Appends worker events to the progress and result streams.
pub struct EventPublisher {
    client: redis::Client,
    progress_stream: String,
    result_stream: String,
}

impl EventPublisher {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing client.
    pub fn with_client(client: redis::Client, config: &QueueConfig) -> Self {
        Self {
            client,
            progress_stream: config.progress_stream.clone(),
            result_stream: config.result_stream.clone(),
        }
    }

    /// Publish a progress event. Returns the entry ID.
    pub async fn publish_progress(&self, event: &ProgressEvent) -> QueueResult<String> {
        self.xadd(&self.progress_stream, &event.to_fields()).await
    }

    /// Publish a terminal result. Returns the entry ID.
    pub async fn publish_result(&self, result: &JobResult) -> QueueResult<String> {
        self.xadd(&self.result_stream, &result.to_fields()).await
    }

    async fn xadd(&self, stream: &str, fields: &[(&'static str, String)]) -> QueueResult<String> {
        if fields.is_empty() {
            return Err(QueueError::publish_failed("no fields to publish"));
        }
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (key, value) in fields {
            cmd.arg(*key).arg(value);
        }
        let id: String = cmd.query_async(&mut conn).await?;

        debug!("Published {} to {}", id, stream);
        Ok(id)
    }
}
