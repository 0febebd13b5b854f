//! Typed, write-once checkpoints of paid stage results.
//!
//! Every metered remote call made for a job is memoized here so a resumed
//! job never pays for the same result twice. Entries are immutable once
//! written; `video_clips` is an accumulator whose individual entries are
//! write-once per (shot, ratio).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{AspectRatio, ClipKey, EnhancementResult, Storyboard, VideoClip};

/// Layout version stamped on every record.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Stable persisted checkpoint keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointKey {
    Enhancements,
    Annotations,
    Storyboard,
    VideoClips,
    VoiceoverSaved,
}

impl CheckpointKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKey::Enhancements => "enhancements",
            CheckpointKey::Annotations => "annotations",
            CheckpointKey::Storyboard => "storyboard",
            CheckpointKey::VideoClips => "video_clips",
            CheckpointKey::VoiceoverSaved => "voiceover_saved",
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CheckpointError {
    #[error("checkpoint '{0}' already written")]
    AlreadyWritten(CheckpointKey),

    #[error("clip checkpoint for {0} already written")]
    ClipAlreadyWritten(ClipKey),
}

/// A memoized value with its write metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord<T> {
    pub schema_version: u32,
    pub written_at: DateTime<Utc>,
    pub value: T,
}

impl<T> CheckpointRecord<T> {
    pub fn new(value: T) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            written_at: Utc::now(),
            value,
        }
    }
}

/// All checkpoints recorded for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enhancements: Option<CheckpointRecord<Vec<EnhancementResult>>>,

    /// Selling-point overlays produced after the storyboard, one per image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotations: Option<CheckpointRecord<Vec<Option<String>>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    storyboard: Option<CheckpointRecord<Storyboard>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    video_clips: Vec<CheckpointRecord<VideoClip>>,

    /// Reference to the uploaded voiceover audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voiceover_saved: Option<CheckpointRecord<String>>,
}

fn put_once<T>(
    slot: &mut Option<CheckpointRecord<T>>,
    key: CheckpointKey,
    value: T,
) -> Result<(), CheckpointError> {
    if slot.is_some() {
        return Err(CheckpointError::AlreadyWritten(key));
    }
    *slot = Some(CheckpointRecord::new(value));
    Ok(())
}

impl Checkpoints {
    pub fn contains(&self, key: CheckpointKey) -> bool {
        match key {
            CheckpointKey::Enhancements => self.enhancements.is_some(),
            CheckpointKey::Annotations => self.annotations.is_some(),
            CheckpointKey::Storyboard => self.storyboard.is_some(),
            CheckpointKey::VideoClips => !self.video_clips.is_empty(),
            CheckpointKey::VoiceoverSaved => self.voiceover_saved.is_some(),
        }
    }

    pub fn enhancements(&self) -> Option<&[EnhancementResult]> {
        self.enhancements.as_ref().map(|r| r.value.as_slice())
    }

    pub fn put_enhancements(&mut self, value: Vec<EnhancementResult>) -> Result<(), CheckpointError> {
        put_once(&mut self.enhancements, CheckpointKey::Enhancements, value)
    }

    pub fn annotations(&self) -> Option<&[Option<String>]> {
        self.annotations.as_ref().map(|r| r.value.as_slice())
    }

    pub fn put_annotations(&mut self, value: Vec<Option<String>>) -> Result<(), CheckpointError> {
        put_once(&mut self.annotations, CheckpointKey::Annotations, value)
    }

    pub fn storyboard(&self) -> Option<&Storyboard> {
        self.storyboard.as_ref().map(|r| &r.value)
    }

    pub fn put_storyboard(&mut self, value: Storyboard) -> Result<(), CheckpointError> {
        put_once(&mut self.storyboard, CheckpointKey::Storyboard, value)
    }

    pub fn voiceover(&self) -> Option<&str> {
        self.voiceover_saved.as_ref().map(|r| r.value.as_str())
    }

    pub fn put_voiceover(&mut self, url: impl Into<String>) -> Result<(), CheckpointError> {
        put_once(&mut self.voiceover_saved, CheckpointKey::VoiceoverSaved, url.into())
    }

    pub fn clip(&self, key: ClipKey) -> Option<&VideoClip> {
        self.video_clips
            .iter()
            .map(|r| &r.value)
            .find(|c| c.key() == key)
    }

    /// Append one generated clip; each (shot, ratio) may be written once.
    pub fn put_clip(&mut self, clip: VideoClip) -> Result<(), CheckpointError> {
        let key = clip.key();
        if self.clip(key).is_some() {
            return Err(CheckpointError::ClipAlreadyWritten(key));
        }
        self.video_clips.push(CheckpointRecord::new(clip));
        Ok(())
    }

    pub fn clips(&self) -> impl Iterator<Item = &VideoClip> {
        self.video_clips.iter().map(|r| &r.value)
    }

    pub fn clip_count(&self) -> usize {
        self.video_clips.len()
    }

    /// Clips for one ratio in shot order.
    pub fn clips_for(&self, aspect_ratio: AspectRatio) -> Vec<&VideoClip> {
        let mut clips: Vec<&VideoClip> = self
            .clips()
            .filter(|c| c.aspect_ratio == aspect_ratio)
            .collect();
        clips.sort_by_key(|c| c.shot);
        clips
    }

    /// Enhancement results as seen by downstream stages, with any
    /// post-storyboard annotation merged in.
    pub fn effective_enhancements(&self) -> Option<Vec<EnhancementResult>> {
        let mut results = self.enhancements()?.to_vec();
        if let Some(annotations) = self.annotations() {
            for (result, annotated) in results.iter_mut().zip(annotations) {
                if let Some(url) = annotated {
                    result.annotated = Some(url.clone());
                }
            }
        }
        Some(results)
    }
}
