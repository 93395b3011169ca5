//! Consumer group behaviour against a live Redis.
//!
//! Run with: `REDIS_URL=redis://localhost:6379 cargo test -p replay-queue -- --ignored`

use std::time::Duration;

use replay_models::{ExportJob, JobId, JobKind, JobResult};
use replay_queue::{EventPublisher, JobQueue, QueueConfig, CURSOR_START};

fn isolated_config(consumer: &str) -> QueueConfig {
    let suffix = uuid::Uuid::new_v4();
    QueueConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        request_stream: format!("test.requests.{}", suffix),
        progress_stream: format!("test.progress.{}", suffix),
        result_stream: format!("test.results.{}", suffix),
        consumer_group: format!("test-group-{}", suffix),
        consumer_name: consumer.to_string(),
        block_timeout: Duration::from_millis(200),
        ..QueueConfig::default()
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unacked_entry_is_reclaimed_by_another_consumer() {
    let config = isolated_config("worker-a");
    let queue_a = JobQueue::new(config.clone()).unwrap();
    queue_a.init().await.unwrap();
    // second init is a no-op
    queue_a.init().await.unwrap();

    let job = ExportJob::new(JobId::from_string("job-1"), JobKind::ExportVideo, "replay-1")
        .with_option("inputPath", "/data/replays/1.jsonl")
        .with_option("outputPath", "/data/replays/exports/1.mp4");
    queue_a.enqueue(&job).await.unwrap();

    // worker-a reads and "crashes" without acking
    let delivered = queue_a.consume(1).await.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].fields.get("jobId").map(String::as_str), Some("job-1"));

    let queue_b = JobQueue::new(QueueConfig {
        consumer_name: "worker-b".to_string(),
        ..config
    })
    .unwrap();

    let batch = queue_b.claim_pending(CURSOR_START).await.unwrap();
    assert_eq!(batch.entries.len(), 1);
    assert_eq!(batch.entries[0].id, delivered[0].id);
    let parsed = ExportJob::from_fields(batch.entries[0].fields.clone()).unwrap();
    assert_eq!(parsed, job);

    queue_b.ack(&batch.entries[0].id).await.unwrap();
    assert_eq!(queue_b.pending_count().await.unwrap(), 0);

    // nothing new: the read times out empty
    assert!(queue_b.consume(1).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_result_is_appended_to_result_stream() {
    let config = isolated_config("worker-a");
    let publisher = EventPublisher::new(&config).unwrap();

    let result = JobResult::succeeded(JobId::from_string("job-2"), "/x/2.mp4", "abc");
    let id = publisher.publish_result(&result).await.unwrap();
    assert!(!id.is_empty());

    let client = redis::Client::open(config.redis_url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let len: u64 = redis::cmd("XLEN")
        .arg(&config.result_stream)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(len, 1);
}
