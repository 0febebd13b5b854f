//! Job record, options, and lifecycle transitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::{AspectRatio, Checkpoints, ProviderKind, SubtitleStyle};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum JobStatus {
    /// Waiting for a worker
    #[default]
    Pending,
    /// A worker is running the pipeline
    Processing,
    /// Every requested ratio has an output
    Completed,
    /// Halted with an error message; can be resubmitted
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a worker may pick the job up.
    pub fn is_runnable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Per-job options, parsed once when the job is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Image-to-video backend
    #[serde(default, alias = "video_provider")]
    pub provider: ProviderKind,

    /// Provider model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_model: Option<String>,

    #[serde(default)]
    pub subtitle_style: SubtitleStyle,

    /// Selling points to overlay during enhancement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selling_points: Vec<String>,

    /// Request style variations during enhancement (costly)
    #[serde(default)]
    pub generate_variations: bool,

    /// Drives background music selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_category: Option<String>,

    /// Explicit music style, overriding category and storyboard hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_style: Option<String>,

    /// Voice override for narration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    /// Output frames for ratios without a built-in frame size
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_dimensions: BTreeMap<AspectRatio, Dimensions>,
}

impl JobOptions {
    /// Output frame for a ratio, falling back to `default`.
    pub fn dimensions_for(&self, aspect_ratio: AspectRatio, default: Dimensions) -> Dimensions {
        if let Some((width, height)) = aspect_ratio.output_dimensions() {
            return Dimensions { width, height };
        }
        self.output_dimensions
            .get(&aspect_ratio)
            .copied()
            .unwrap_or(default)
    }
}

/// Incoming request to create a job.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewJobRequest {
    #[validate(length(min = 1, max = 20))]
    pub image_urls: Vec<String>,

    #[validate(length(min = 1, max = 6))]
    pub aspect_ratios: Vec<AspectRatio>,

    #[serde(default)]
    pub options: JobOptions,
}

impl NewJobRequest {
    /// Build a pending job, dropping duplicate ratios.
    pub fn into_job(self, owner_id: impl Into<String>) -> Result<Job, validator::ValidationErrors> {
        self.validate()?;

        let mut aspect_ratios = Vec::with_capacity(self.aspect_ratios.len());
        for ratio in self.aspect_ratios {
            if !aspect_ratios.contains(&ratio) {
                aspect_ratios.push(ratio);
            }
        }

        Ok(Job::new(owner_id, self.image_urls, aspect_ratios, self.options))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum JobStateError {
    #[error("job {job_id} cannot {action} from status {status}")]
    InvalidTransition {
        job_id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("job {job_id} is missing outputs for {missing:?}")]
    MissingOutputs {
        job_id: JobId,
        missing: Vec<AspectRatio>,
    },
}

/// A marketing-video job and everything the pipeline has produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Owning user
    pub owner_id: String,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), never decreases
    #[serde(default)]
    pub progress: u8,

    /// Input product images, in order
    pub image_urls: Vec<String>,

    /// Requested output ratios, in order
    pub aspect_ratios: Vec<AspectRatio>,

    #[serde(default)]
    pub options: JobOptions,

    #[serde(default)]
    pub checkpoints: Checkpoints,

    /// Final video per ratio
    #[serde(default)]
    pub video_urls: BTreeMap<AspectRatio, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency counter, bumped on every commit
    #[serde(default)]
    pub version: u64,
}

impl Job {
    pub fn new(
        owner_id: impl Into<String>,
        image_urls: Vec<String>,
        aspect_ratios: Vec<AspectRatio>,
        options: JobOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            image_urls,
            aspect_ratios,
            options,
            checkpoints: Checkpoints::default(),
            video_urls: BTreeMap::new(),
            thumbnail_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    fn invalid(&self, action: &'static str) -> JobStateError {
        JobStateError::InvalidTransition {
            job_id: self.id.clone(),
            status: self.status,
            action,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move into processing. Re-entering from `Processing` resumes a
    /// previously interrupted run.
    pub fn start(&mut self) -> Result<(), JobStateError> {
        if !self.status.is_runnable() {
            return Err(self.invalid("start"));
        }
        self.status = JobStatus::Processing;
        self.touch();
        Ok(())
    }

    /// Raise progress; lower values are ignored.
    pub fn advance_progress(&mut self, progress: u8) {
        let progress = progress.min(100);
        if progress > self.progress {
            self.progress = progress;
            self.touch();
        }
    }

    /// Record a final output for one ratio.
    pub fn set_output(&mut self, aspect_ratio: AspectRatio, url: impl Into<String>) {
        self.video_urls.insert(aspect_ratio, url.into());
        self.touch();
    }

    pub fn missing_outputs(&self) -> Vec<AspectRatio> {
        self.aspect_ratios
            .iter()
            .filter(|r| !self.video_urls.contains_key(r))
            .copied()
            .collect()
    }

    /// Mark the job completed. Every requested ratio must have an output.
    pub fn complete(&mut self) -> Result<(), JobStateError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid("complete"));
        }
        let missing = self.missing_outputs();
        if !missing.is_empty() {
            return Err(JobStateError::MissingOutputs {
                job_id: self.id.clone(),
                missing,
            });
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.error_message = None;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Mark the job failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.touch();
    }

    /// Put a failed job back in the queue. Checkpoints and progress are
    /// kept so paid stages are not repeated.
    pub fn resubmit(&mut self) -> Result<(), JobStateError> {
        if self.status != JobStatus::Failed {
            return Err(self.invalid("resubmit"));
        }
        self.status = JobStatus::Pending;
        self.error_message = None;
        self.touch();
        Ok(())
    }
}
