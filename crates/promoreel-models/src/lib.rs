//! Shared data models for the PromoReel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, options, and lifecycle transitions
//! - Storyboards and shots
//! - Generated clips and enhancement results
//! - Typed, write-once stage checkpoints
//! - Aspect ratio tokens and video provider selection
//! - The external job status document

pub mod checkpoint;
pub mod clip;
pub mod enhancement;
pub mod job;
pub mod job_status;
pub mod provider;
pub mod stage;
pub mod storyboard;
pub mod style;

// Re-export common types
pub use checkpoint::{
    CheckpointError, CheckpointKey, CheckpointRecord, Checkpoints, CHECKPOINT_SCHEMA_VERSION,
};
pub use clip::{ClipKey, VideoClip};
pub use enhancement::EnhancementResult;
pub use job::{Dimensions, Job, JobId, JobOptions, JobStateError, JobStatus, NewJobRequest};
pub use job_status::{JobStatusDocument, StatusMetadata};
pub use provider::{ProviderKind, ProviderParseError};
pub use stage::{clip_progress, milestones, Stage};
pub use storyboard::{ImageRef, Shot, Storyboard, StoryboardError, DEFAULT_MOTION_PROMPT};
pub use style::{AspectRatio, AspectRatioParseError, SubtitleStyle, SubtitleStyleParseError};
