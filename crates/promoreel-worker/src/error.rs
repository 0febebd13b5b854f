//! Worker error types.

use thiserror::Error;

use promoreel_models::{CheckpointError, JobStateError, Stage};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// A pipeline stage failed. Its display is what the job records as
/// `error_message`.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Box<WorkerError>,
}

impl StageError {
    pub fn new(stage: Stage, source: impl Into<WorkerError>) -> Self {
        Self {
            stage,
            source: Box::new(source.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Job failed: {0}")]
    JobFailed(String),

    /// A paid result was obtained but the job holding it could not be
    /// committed. Redelivering would pay for it again.
    #[error("{stage} failed: result could not be saved: {source}")]
    Unsaved {
        stage: Stage,
        #[source]
        source: promoreel_queue::QueueError,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    JobState(#[from] JobStateError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Provider(#[from] promoreel_providers::ProviderError),

    #[error(transparent)]
    Media(#[from] promoreel_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] promoreel_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] promoreel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether redelivering the job message may help. Stage failures and
    /// unsaved paid results are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Queue(e) => {
                e.is_retryable()
                    || matches!(e, promoreel_queue::QueueError::VersionConflict { .. })
            }
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Io(_) | WorkerError::Media(_) => true,
            _ => false,
        }
    }

    /// The stage this error was raised in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkerError::Stage(e) => Some(e.stage),
            WorkerError::Unsaved { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
