//! Redis-bound queue round-trip tests.

use std::time::Duration;

use storygen_models::{JobId, JobInput, JobStatus, JobStatusSnapshot, Product, StatusEvent};
use storygen_queue::{JobQueue, ProgressChannel, QueueJob};

fn test_job() -> QueueJob {
    QueueJob::new(JobId::new(), JobInput::new(Product::TemplateVideo))
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    queue.ping().await.expect("Failed to ping broker");
    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job enqueue, fetch and ack cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_fetch_ack() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = test_job();
    let job_id = job.job_id.clone();

    let message_id = queue.enqueue(&job).await.expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", job_id, message_id);

    let delivery = queue
        .fetch("test-consumer", Duration::from_secs(1))
        .await
        .expect("Failed to fetch")
        .expect("Expected a delivery");

    assert_eq!(delivery.job.job_id, job_id);

    queue.ack(&delivery.message_id).await.expect("Failed to ack");
}

/// Test that requeue makes the job claimable again.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_requeue_cycle() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = test_job();
    queue.enqueue(&job).await.expect("Failed to enqueue");

    let delivery = queue
        .fetch("test-consumer-a", Duration::from_secs(1))
        .await
        .expect("Failed to fetch")
        .expect("Expected a delivery");

    queue
        .requeue(&delivery.message_id, &delivery.job)
        .await
        .expect("Failed to requeue");

    let redelivery = queue
        .fetch("test-consumer-b", Duration::from_secs(1))
        .await
        .expect("Failed to fetch after requeue")
        .expect("Expected the requeued delivery");

    assert_eq!(redelivery.job.job_id, job.job_id);
    queue.ack(&redelivery.message_id).await.expect("Failed to ack");
}

/// Test status snapshot cache round-trip.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_snapshot_cache() {
    dotenvy::dotenv().ok();

    let channel = ProgressChannel::from_env().expect("Failed to create channel");

    let job_id = JobId::new();
    let mut snapshot = JobStatusSnapshot::new(job_id.as_str());
    snapshot.set_processing("voice", 37, "test-worker");

    channel
        .put_snapshot(&snapshot)
        .await
        .expect("Failed to write snapshot");

    let back = channel
        .get_snapshot(&job_id)
        .await
        .expect("Failed to read snapshot")
        .expect("Expected a cached snapshot");

    assert_eq!(back.status, JobStatus::Processing);
    assert_eq!(back.progress, 37);
    assert_eq!(back.current_stage.as_deref(), Some("voice"));
}

/// Test progress pub/sub delivery.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_status_publish() {
    dotenvy::dotenv().ok();

    let channel = ProgressChannel::from_env().expect("Failed to create channel");

    // Publishing with no subscribers must succeed (at-most-once contract).
    let event = StatusEvent::new(JobId::new(), JobStatus::Processing, "test-worker");
    channel
        .publish_status(&event)
        .await
        .expect("Failed to publish status event");
}
