//! Job persistence boundary used by the orchestrator.
//!
//! The orchestrator reads a job once, mutates it stage by stage and
//! commits after every checkpoint. Commits are optimistic: a writer
//! holding a stale version gets `QueueError::VersionConflict`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use promoreel_models::{Job, JobId, JobStatus};
use promoreel_queue::{QueueError, QueueResult, RedisJobStore};

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> QueueResult<()>;

    async fn load(&self, job_id: &JobId) -> QueueResult<Job>;

    /// Persist `job` if its version is current, then advance the version.
    async fn commit(&self, job: &mut Job) -> QueueResult<()>;
}

#[async_trait]
impl JobRepository for RedisJobStore {
    async fn create(&self, job: &Job) -> QueueResult<()> {
        RedisJobStore::create(self, job).await
    }

    async fn load(&self, job_id: &JobId) -> QueueResult<Job> {
        RedisJobStore::load(self, job_id).await
    }

    async fn commit(&self, job: &mut Job) -> QueueResult<()> {
        RedisJobStore::commit(self, job).await
    }
}

/// Process-local repository. Keeps every committed (status, progress)
/// pair so callers can inspect how a job moved.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<JobId, Job>>,
    history: Mutex<HashMap<JobId, Vec<(JobStatus, u8)>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed (status, progress) pairs in commit order.
    pub fn history(&self, job_id: &JobId) -> Vec<(JobStatus, u8)> {
        self.history
            .lock()
            .map(|h| h.get(job_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn record(&self, job: &Job) {
        if let Ok(mut history) = self.history.lock() {
            history
                .entry(job.id.clone())
                .or_default()
                .push((job.status, job.progress));
        }
    }
}

fn poisoned() -> QueueError {
    QueueError::connection_failed("in-memory repository lock poisoned")
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> QueueResult<()> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::JobExists(job.id.to_string()));
        }
        jobs.insert(job.id.clone(), job.clone());
        drop(jobs);
        self.record(job);
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> QueueResult<Job> {
        let jobs = self.jobs.lock().map_err(|_| poisoned())?;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::not_found(job_id.to_string()))
    }

    async fn commit(&self, job: &mut Job) -> QueueResult<()> {
        let mut jobs = self.jobs.lock().map_err(|_| poisoned())?;
        let stored = jobs
            .get_mut(&job.id)
            .ok_or_else(|| QueueError::not_found(job.id.to_string()))?;

        if stored.version != job.version {
            return Err(QueueError::VersionConflict {
                job_id: job.id.to_string(),
                expected: job.version,
            });
        }

        job.version += 1;
        *stored = job.clone();
        drop(jobs);
        self.record(job);
        Ok(())
    }
}
