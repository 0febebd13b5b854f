//! Redis key layout.

use promoreel_models::JobId;

pub const JOBS_STREAM: &str = "promoreel:jobs";
pub const WORKER_GROUP: &str = "promoreel:workers";
pub const DLQ_STREAM: &str = "promoreel:dlq";

pub fn job_key(job_id: &JobId) -> String {
    format!("promoreel:job:{}", job_id)
}

pub fn lock_key(job_id: &JobId) -> String {
    format!("promoreel:lock:{}", job_id)
}

pub fn dedup_key(job_id: &JobId) -> String {
    format!("promoreel:dedup:{}", job_id)
}

pub fn retry_key(message_id: &str) -> String {
    format!("promoreel:retry:{}", message_id)
}

/// Pub/Sub channel carrying status documents for one job.
pub fn status_channel(job_id: &JobId) -> String {
    format!("promoreel:status:{}", job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = JobId::from_string("abc");
        assert_eq!(job_key(&id), "promoreel:job:abc");
        assert_eq!(lock_key(&id), "promoreel:lock:abc");
        assert_eq!(dedup_key(&id), "promoreel:dedup:abc");
        assert_eq!(status_channel(&id), "promoreel:status:abc");
        assert_eq!(retry_key("1-0"), "promoreel:retry:1-0");
    }
}
