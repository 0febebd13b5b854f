//! Per-job execution lock.
//!
//! A worker holds `promoreel:lock:{job_id}` for as long as it runs the job.
//! The value is a random token so only the holder can refresh or release
//! it; an expired lock can be taken over by another worker.

use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use promoreel_models::JobId;

use crate::error::{QueueError, QueueResult};
use crate::keys;

const REFRESH_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Acquires execution locks.
#[derive(Clone)]
pub struct JobLocks {
    client: redis::Client,
    ttl: Duration,
}

impl JobLocks {
    pub fn new(redis_url: &str, ttl: Duration) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Take the lock for a job, failing with [`QueueError::LockHeld`] if
    /// another worker holds it.
    pub async fn acquire(&self, job_id: &JobId) -> QueueResult<JobLock> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = keys::lock_key(job_id);
        let token = Uuid::new_v4().to_string();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        if acquired.is_none() {
            return Err(QueueError::LockHeld(job_id.to_string()));
        }

        debug!(job_id = %job_id, "Acquired job lock");
        Ok(JobLock {
            client: self.client.clone(),
            job_id: job_id.clone(),
            key,
            token,
            ttl: self.ttl,
        })
    }
}

/// A held job lock.
pub struct JobLock {
    client: redis::Client,
    job_id: JobId,
    key: String,
    token: String,
    ttl: Duration,
}

impl JobLock {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Extend the lock's expiry. Fails with [`QueueError::LockLost`] when
    /// the lock expired and was taken by someone else.
    pub async fn refresh(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let refreshed: i64 = redis::Script::new(REFRESH_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        if refreshed == 0 {
            warn!(job_id = %self.job_id, "Job lock lost");
            return Err(QueueError::LockLost(self.job_id.to_string()));
        }
        Ok(())
    }

    /// Release the lock if still held by this token.
    pub async fn release(self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            warn!(job_id = %self.job_id, "Job lock expired before release");
        } else {
            debug!(job_id = %self.job_id, "Released job lock");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_lock_is_exclusive() {
        let locks = JobLocks::new(&redis_url(), Duration::from_secs(5)).unwrap();
        let job_id = JobId::new();

        let lock = locks.acquire(&job_id).await.unwrap();
        assert!(matches!(
            locks.acquire(&job_id).await,
            Err(QueueError::LockHeld(_))
        ));

        lock.refresh().await.unwrap();
        lock.release().await.unwrap();

        let again = locks.acquire(&job_id).await.unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_expired_lock_cannot_be_refreshed() {
        let short = JobLocks::new(&redis_url(), Duration::from_millis(50)).unwrap();
        let long = JobLocks::new(&redis_url(), Duration::from_secs(5)).unwrap();
        let job_id = JobId::new();

        let stale = short.acquire(&job_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let fresh = long.acquire(&job_id).await.unwrap();

        assert!(matches!(stale.refresh().await, Err(QueueError::LockLost(_))));
        stale.release().await.unwrap();
        fresh.refresh().await.unwrap();
        fresh.release().await.unwrap();
    }
}
