//! External job status document returned to clients.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Job, JobId, JobStatus};

/// Snapshot of a job in the shape clients poll for.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusDocument {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub image_urls: Vec<String>,
    /// Final video per ratio token, absent until the first output exists
    pub video_urls: Option<BTreeMap<String, String>>,
    pub thumbnail_url: Option<String>,
    pub error_message: Option<String>,
    /// Checkpointed stage results under their stable keys
    pub metadata: StatusMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusMetadata {
    pub enhancements: Option<serde_json::Value>,
    pub storyboard: Option<serde_json::Value>,
    pub video_clips: Option<serde_json::Value>,
    pub voiceover_saved: Option<String>,
}

impl From<&Job> for JobStatusDocument {
    fn from(job: &Job) -> Self {
        let checkpoints = &job.checkpoints;
        let clips: Vec<_> = checkpoints.clips().collect();

        let metadata = StatusMetadata {
            enhancements: checkpoints
                .effective_enhancements()
                .and_then(|e| serde_json::to_value(e).ok()),
            storyboard: checkpoints
                .storyboard()
                .and_then(|s| serde_json::to_value(s).ok()),
            video_clips: (!clips.is_empty())
                .then(|| serde_json::to_value(&clips).ok())
                .flatten(),
            voiceover_saved: checkpoints.voiceover().map(str::to_string),
        };

        let video_urls = (!job.video_urls.is_empty()).then(|| {
            job.video_urls
                .iter()
                .map(|(ratio, url)| (ratio.token(), url.clone()))
                .collect()
        });

        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            image_urls: job.image_urls.clone(),
            video_urls,
            thumbnail_url: job.thumbnail_url.clone(),
            error_message: job.error_message.clone(),
            metadata,
            created_at: job.created_at,
        }
    }
}
