//! Job documents in Redis with optimistic versioning.
//!
//! Each job lives in a hash at `promoreel:job:{job_id}` with two fields:
//! `version` and `doc` (the JSON job record). Commits are compare-and-set
//! on `version`, so a writer holding a stale copy gets
//! [`QueueError::VersionConflict`] instead of overwriting newer state.
//! Every successful write also publishes the job's status document on
//! `promoreel:status:{job_id}`.

use tracing::debug;

use promoreel_models::{Job, JobId, JobStatusDocument};

use crate::error::{QueueError, QueueResult};
use crate::keys;

const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[1], 'doc', ARGV[2])
redis.call('PUBLISH', KEYS[2], ARGV[3])
return 1
"#;

const COMMIT_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then
    return -1
end
if current ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'doc', ARGV[3])
redis.call('PUBLISH', KEYS[2], ARGV[4])
return 1
"#;

/// Redis-backed job document store.
#[derive(Clone)]
pub struct RedisJobStore {
    client: redis::Client,
}

impl RedisJobStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Store a new job. Fails with [`QueueError::JobExists`] if the id is taken.
    pub async fn create(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let doc = serde_json::to_string(job)?;
        let status = serde_json::to_string(&JobStatusDocument::from(job))?;

        let created: i64 = redis::Script::new(CREATE_SCRIPT)
            .key(keys::job_key(&job.id))
            .key(keys::status_channel(&job.id))
            .arg(job.version)
            .arg(doc)
            .arg(status)
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(QueueError::JobExists(job.id.to_string()));
        }
        debug!(job_id = %job.id, "Created job document");
        Ok(())
    }

    /// Load the current job document.
    pub async fn load(&self, job_id: &JobId) -> QueueResult<Job> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (version, doc): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(keys::job_key(job_id))
            .arg("version")
            .arg("doc")
            .query_async(&mut conn)
            .await?;

        let (Some(version), Some(doc)) = (version, doc) else {
            return Err(QueueError::not_found(job_id.to_string()));
        };

        let mut job: Job = serde_json::from_str(&doc)
            .map_err(|e| QueueError::Serialization(format!("job {}: {}", job_id, e)))?;
        job.version = version;
        Ok(job)
    }

    /// Write `job` if nobody else committed since it was loaded. On success
    /// `job.version` is advanced to the stored version.
    pub async fn commit(&self, job: &mut Job) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let expected = job.version;

        let mut next = job.clone();
        next.version = expected + 1;
        let doc = serde_json::to_string(&next)?;
        let status = serde_json::to_string(&JobStatusDocument::from(&next))?;

        let result: i64 = redis::Script::new(COMMIT_SCRIPT)
            .key(keys::job_key(&job.id))
            .key(keys::status_channel(&job.id))
            .arg(expected)
            .arg(next.version)
            .arg(doc)
            .arg(status)
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => {
                job.version = next.version;
                debug!(job_id = %job.id, version = job.version, "Committed job");
                Ok(())
            }
            0 => Err(QueueError::VersionConflict {
                job_id: job.id.to_string(),
                expected,
            }),
            _ => Err(QueueError::not_found(job.id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promoreel_models::{AspectRatio, JobOptions};

    fn store() -> RedisJobStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        RedisJobStore::new(&url).unwrap()
    }

    fn job() -> Job {
        Job::new(
            "user-1",
            vec!["https://cdn.example.com/a.jpg".into()],
            vec![AspectRatio::LANDSCAPE],
            JobOptions::default(),
        )
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_create_load_commit() {
        let store = store();
        let mut job = job();
        store.create(&job).await.unwrap();
        assert!(matches!(store.create(&job).await, Err(QueueError::JobExists(_))));

        job.start().unwrap();
        store.commit(&mut job).await.unwrap();
        assert_eq!(job.version, 1);

        let loaded = store.load(&job.id).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.status, job.status);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_stale_commit_conflicts() {
        let store = store();
        let job = job();
        store.create(&job).await.unwrap();

        let mut first = store.load(&job.id).await.unwrap();
        let mut second = store.load(&job.id).await.unwrap();

        first.advance_progress(10);
        store.commit(&mut first).await.unwrap();

        second.advance_progress(20);
        assert!(matches!(
            store.commit(&mut second).await,
            Err(QueueError::VersionConflict { expected: 0, .. })
        ));
        assert_eq!(second.version, 0);
        assert_eq!(store.load(&job.id).await.unwrap().progress, 10);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_missing_job() {
        let store = store();
        let mut job = job();
        assert!(matches!(store.load(&job.id).await, Err(QueueError::JobNotFound(_))));
        assert!(matches!(store.commit(&mut job).await, Err(QueueError::JobNotFound(_))));
    }
}
