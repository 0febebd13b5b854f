//! Redis integration tests for the queue, job store, lock and status channel.

use std::time::Duration;

use futures::StreamExt;

use promoreel_models::{AspectRatio, Job, JobId, JobOptions, JobStatus};
use promoreel_queue::{JobLocks, JobMessage, JobQueue, QueueError, RedisJobStore, StatusChannel};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn job() -> Job {
    Job::new(
        "integration-user",
        vec!["https://cdn.example.com/product.jpg".into()],
        vec![AspectRatio::LANDSCAPE, AspectRatio::PORTRAIT],
        JobOptions::default(),
    )
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    // A second init must tolerate the existing group.
    queue.init().await.expect("Failed to re-initialize queue");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Enqueue, consume and ack one message; duplicates are rejected until acked.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_dequeue() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job_id = JobId::new();
    let message_id = queue.enqueue(&job_id).await.expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", job_id, message_id);

    assert!(matches!(
        queue.enqueue(&job_id).await,
        Err(QueueError::EnqueueFailed(_))
    ));

    let jobs = queue
        .consume("test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");
    let (msg_id, message) = jobs
        .iter()
        .find(|(_, m)| m.job_id == job_id)
        .expect("enqueued job not consumed");
    assert_eq!(msg_id, &message_id);
    assert_eq!(message, &JobMessage::new(job_id.clone()));

    queue.ack(msg_id).await.expect("Failed to ack");
    queue.clear_dedup(&job_id).await.expect("Failed to clear dedup");

    let again = queue.enqueue(&job_id).await.expect("Failed to re-enqueue");
    let jobs = queue.consume("test-consumer", 1000, 10).await.expect("Failed to consume");
    for (id, _) in &jobs {
        queue.ack(id).await.ok();
    }
    assert!(jobs.iter().any(|(id, _)| id == &again));
    queue.clear_dedup(&job_id).await.ok();
}

/// Test DLQ functionality.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dlq() {
    dotenvy::dotenv().ok();

    let queue = JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job_id = JobId::new();
    let message_id = queue.enqueue(&job_id).await.expect("Failed to enqueue");
    let jobs = queue
        .consume("test-dlq-consumer", 1000, 10)
        .await
        .expect("Failed to consume");
    assert!(!jobs.is_empty());

    for attempt in 1..=queue.max_retries() {
        let count = queue.increment_retry(&message_id).await.expect("Failed to count retry");
        assert_eq!(count, attempt);
    }

    let before = queue.dlq_len().await.expect("Failed to get DLQ length");
    queue
        .dlq(&message_id, &JobMessage::new(job_id.clone()), "Test error")
        .await
        .expect("Failed to move to DLQ");
    let after = queue.dlq_len().await.expect("Failed to get DLQ length");
    assert_eq!(after, before + 1);

    queue.clear_dedup(&job_id).await.ok();
}

/// Commits are versioned: a stale copy gets a conflict instead of overwriting.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_store_versioning() {
    let store = RedisJobStore::new(&redis_url()).expect("Failed to create store");

    let mut job = job();
    store.create(&job).await.expect("Failed to create job");
    assert!(matches!(store.create(&job).await, Err(QueueError::JobExists(_))));

    let mut stale = store.load(&job.id).await.expect("Failed to load job");

    job.start().unwrap();
    job.advance_progress(10);
    store.commit(&mut job).await.expect("Failed to commit");

    stale.advance_progress(20);
    assert!(matches!(
        store.commit(&mut stale).await,
        Err(QueueError::VersionConflict { .. })
    ));

    let loaded = store.load(&job.id).await.expect("Failed to reload job");
    assert_eq!(loaded.status, JobStatus::Processing);
    assert_eq!(loaded.progress, 10);
    assert_eq!(loaded.version, job.version);
}

/// Every commit publishes the job status document.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_status_channel() {
    let url = redis_url();
    let store = RedisJobStore::new(&url).expect("Failed to create store");
    let channel = StatusChannel::new(&url).expect("Failed to create status channel");

    let mut job = job();
    store.create(&job).await.expect("Failed to create job");

    let mut updates = channel.subscribe(&job.id).await.expect("Failed to subscribe");

    job.start().unwrap();
    job.advance_progress(30);
    store.commit(&mut job).await.expect("Failed to commit");

    let doc = tokio::time::timeout(Duration::from_secs(2), updates.next())
        .await
        .expect("no status published")
        .expect("status stream ended");
    assert_eq!(doc.job_id, job.id);
    assert_eq!(doc.status, JobStatus::Processing);
    assert_eq!(doc.progress, 30);
    assert!(doc.video_urls.is_none());
}

/// Only one holder of a job's execution lock at a time.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_execution_lock() {
    let locks = JobLocks::new(&redis_url(), Duration::from_secs(30)).expect("Failed to create locks");
    let job_id = JobId::new();

    let lock = locks.acquire(&job_id).await.expect("Failed to acquire lock");
    assert!(matches!(locks.acquire(&job_id).await, Err(QueueError::LockHeld(_))));

    lock.refresh().await.expect("Failed to refresh lock");
    lock.release().await.expect("Failed to release lock");

    let again = locks.acquire(&job_id).await.expect("Failed to reacquire lock");
    again.release().await.ok();
}
