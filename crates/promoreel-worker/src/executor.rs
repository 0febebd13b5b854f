//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use promoreel_models::JobId;
use promoreel_queue::{JobLock, JobLocks, JobMessage, JobQueue, QueueError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::orchestrator::{JobOutcome, Orchestrator};
use crate::retry::{retry_async, FailureTracker, RetryConfig};

/// What to do with a stream message once its job has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Done with it, successfully or for good
    Ack,
    /// Let it be redelivered, or dead-letter it once retries run out
    Retry,
    /// Another worker owns the job; leave the message pending
    Leave,
}

fn disposition(result: &WorkerResult<JobOutcome>) -> Disposition {
    match result {
        Ok(_) => Disposition::Ack,
        Err(WorkerError::Queue(QueueError::LockHeld(_) | QueueError::LockLost(_))) => {
            Disposition::Leave
        }
        Err(e) if e.is_retryable() => Disposition::Retry,
        Err(_) => Disposition::Ack,
    }
}

/// State shared by every job task.
struct JobContext {
    queue: Arc<JobQueue>,
    locks: JobLocks,
    orchestrator: Orchestrator,
    lock_refresh_interval: Duration,
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, locks: JobLocks, orchestrator: Orchestrator) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        let ctx = Arc::new(JobContext {
            queue: Arc::new(queue),
            locks,
            orchestrator,
            lock_refresh_interval: config.lock_refresh_interval,
        });

        Self {
            config,
            ctx,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.ctx.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claimer();

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

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they resume on redelivery",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over messages whose consumer died mid-job.
    fn spawn_claimer(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let consumer_name = self.consumer_name.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

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
                        match ctx.queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, message) in jobs {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, message_id, message).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .ctx
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, message) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, message_id, message).await;
            });
        }

        Ok(())
    }

    /// Run one job under its execution lock, then settle the message.
    async fn execute_job(ctx: Arc<JobContext>, message_id: String, message: JobMessage) {
        let job_id = message.job_id.clone();
        info!("Executing job {}", job_id);

        let result = match ctx.locks.acquire(&job_id).await {
            Ok(lock) => {
                let result = Self::run_locked(&ctx, &lock).await;
                if let Err(e) = lock.release().await {
                    warn!("Failed to release lock for job {}: {}", job_id, e);
                }
                result
            }
            Err(e) => Err(e.into()),
        };

        match disposition(&result) {
            Disposition::Ack => {
                match &result {
                    Ok(outcome) => info!("Job {} finished: {:?}", job_id, outcome),
                    Err(e) => error!("Job {} cannot run: {}", job_id, e),
                }
                Self::settle(&ctx, &message_id, &job_id).await;
            }
            Disposition::Leave => {
                if let Err(e) = &result {
                    info!("Leaving job {} pending: {}", job_id, e);
                }
            }
            Disposition::Retry => {
                let error = match &result {
                    Err(e) => e.to_string(),
                    Ok(_) => String::new(),
                };
                Self::retry_or_dead_letter(&ctx, &message_id, &message, &error).await;
            }
        }
    }

    /// Drive the orchestrator while keeping the execution lock alive.
    async fn run_locked(ctx: &JobContext, lock: &JobLock) -> WorkerResult<JobOutcome> {
        let run = ctx.orchestrator.run(lock.job_id());
        tokio::pin!(run);

        let mut refresh = tokio::time::interval(ctx.lock_refresh_interval);
        refresh.tick().await;
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = refresh.tick() => {
                    match lock.refresh().await {
                        Ok(()) => failures.record_success(),
                        Err(e @ QueueError::LockLost(_)) => {
                            warn!("Lost execution lock for job {}, abandoning run", lock.job_id());
                            return Err(e.into());
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!("Failed to refresh lock for job {}: {}", lock.job_id(), e);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Ack the message and clear its dedup key so the job can be enqueued again.
    async fn settle(ctx: &JobContext, message_id: &str, job_id: &JobId) {
        let config = RetryConfig::new("ack job message").with_max_retries(2);
        if let Err((e, attempts)) = retry_async(&config, || ctx.queue.ack(message_id)).await {
            error!("Failed to ack job {} after {} attempts: {}", job_id, attempts, e);
        }
        if let Err(e) = ctx.queue.clear_dedup(job_id).await {
            warn!("Failed to clear dedup key for job {}: {}", job_id, e);
        }
    }

    async fn retry_or_dead_letter(ctx: &JobContext, message_id: &str, message: &JobMessage, error: &str) {
        let job_id = &message.job_id;
        error!("Job {} failed: {}", job_id, error);

        let retry_count = ctx.queue.increment_retry(message_id).await.unwrap_or(u32::MAX);
        let max_retries = ctx.queue.max_retries();

        if retry_count < max_retries {
            info!(
                "Job {} will be retried (attempt {}/{})",
                job_id, retry_count, max_retries
            );
            return;
        }

        warn!("Job {} exceeded max retries ({}), moving to DLQ", job_id, max_retries);
        metrics::record_job_failed(None);
        if let Err(e) = ctx.queue.dlq(message_id, message, error).await {
            error!("Failed to move job {} to DLQ: {}", job_id, e);
        }
        if let Err(e) = ctx.queue.clear_dedup(job_id).await {
            warn!("Failed to clear dedup key for job {}: {}", job_id, e);
        }

        let reason = format!("Job failed after {} attempts: {}", max_retries, error);
        if let Err(e) = ctx.orchestrator.mark_failed(job_id, &reason).await {
            error!("Failed to record failure of job {}: {}", job_id, e);
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
