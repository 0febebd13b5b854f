//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Dequeue failed: {0}")]
    DequeueFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} already exists")]
    JobExists(String),

    #[error("Version conflict on job {job_id}: expected version {expected}")]
    VersionConflict { job_id: String, expected: u64 },

    #[error("Job {0} is locked by another worker")]
    LockHeld(String),

    #[error("Lock on job {0} was lost")]
    LockLost(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound(job_id.into())
    }

    /// Whether the operation may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) | QueueError::LockHeld(_) => true,
            QueueError::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            _ => false,
        }
    }
}
