//! Storyboard and shot models produced by the script generator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prompt used for image-to-video when a shot carries no motion hint.
pub const DEFAULT_MOTION_PROMPT: &str = "Smooth product showcase";

/// Which source image a shot animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawImageRef", into = "RawImageRef")]
pub enum ImageRef {
    /// Index into the enhanced image list
    Index(usize),
    /// External footage suggested by the script writer
    Broll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawImageRef {
    Index(usize),
    Label(String),
}

impl From<RawImageRef> for ImageRef {
    fn from(raw: RawImageRef) -> Self {
        match raw {
            RawImageRef::Index(i) => ImageRef::Index(i),
            RawImageRef::Label(label) => match label.trim().parse::<usize>() {
                Ok(i) => ImageRef::Index(i),
                Err(_) => ImageRef::Broll,
            },
        }
    }
}

impl From<ImageRef> for RawImageRef {
    fn from(value: ImageRef) -> Self {
        match value {
            ImageRef::Index(i) => RawImageRef::Index(i),
            ImageRef::Broll => RawImageRef::Label("b-roll".to_string()),
        }
    }
}

/// One shot of the storyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    /// 1-based position in the storyboard
    #[serde(rename = "shot_number")]
    pub index: u32,

    #[serde(rename = "image_reference")]
    pub image: ImageRef,

    /// Subtitle text
    pub text: String,

    /// Duration in seconds
    #[serde(rename = "duration")]
    pub duration_secs: f64,

    /// Attention-grabbing opener (first shot only)
    #[serde(default)]
    pub hook: bool,

    #[serde(default)]
    pub selling_points: Vec<String>,

    /// Call to action (last shot only)
    #[serde(default)]
    pub cta: String,

    /// Motion hint passed to the video provider
    #[serde(
        default,
        rename = "action_instructions",
        alias = "motion_prompt",
        skip_serializing_if = "Option::is_none"
    )]
    pub motion_prompt: Option<String>,
}

impl Shot {
    /// Prompt for the video provider.
    pub fn prompt(&self) -> &str {
        self.motion_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_MOTION_PROMPT)
    }

    /// Resolve the enhanced image this shot animates.
    ///
    /// B-roll and out-of-range references fall back to cycling through the
    /// available images by shot position.
    pub fn image_index(&self, position: usize, image_count: usize) -> usize {
        if image_count == 0 {
            return 0;
        }
        match self.image {
            ImageRef::Index(i) if i < image_count => i,
            _ => position % image_count,
        }
    }
}

/// Complete storyboard for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyboard {
    pub shots: Vec<Shot>,

    #[serde(default)]
    pub hook_text: String,

    #[serde(default)]
    pub main_selling_points: Vec<String>,

    #[serde(default)]
    pub final_cta: String,

    #[serde(default)]
    pub total_duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_style: Option<String>,
}

impl Storyboard {
    /// Shot count the script writer is asked to produce.
    pub const EXPECTED_SHOTS: std::ops::RangeInclusive<usize> = 3..=6;

    /// Validate and normalize a storyboard as returned by the script writer.
    ///
    /// Shots are renumbered 1..n, the opener flag is kept on the first shot
    /// only, and calls to action are cleared everywhere but the last shot.
    pub fn normalize(mut self) -> Result<Self, StoryboardError> {
        if self.shots.is_empty() {
            return Err(StoryboardError::NoShots);
        }

        let last = self.shots.len() - 1;
        for (i, shot) in self.shots.iter_mut().enumerate() {
            if !shot.duration_secs.is_finite() || shot.duration_secs <= 0.0 {
                return Err(StoryboardError::InvalidDuration {
                    shot: i + 1,
                    duration: shot.duration_secs,
                });
            }
            shot.index = (i + 1) as u32;
            shot.hook = i == 0;
            if i != last {
                shot.cta.clear();
            }
        }

        if self.shots[last].cta.trim().is_empty() && !self.final_cta.trim().is_empty() {
            self.shots[last].cta = self.final_cta.clone();
        }

        self.total_duration = self.total_duration();
        Ok(self)
    }

    /// Sum of shot durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.shots.iter().map(|s| s.duration_secs).sum()
    }

    /// Subtitle text for narration, shots joined by single spaces.
    pub fn narration(&self) -> String {
        self.shots
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Selling points for the annotation overlay.
    pub fn top_selling_points(&self, n: usize) -> Vec<String> {
        self.main_selling_points.iter().take(n).cloned().collect()
    }

    pub fn has_expected_shot_count(&self) -> bool {
        Self::EXPECTED_SHOTS.contains(&self.shots.len())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum StoryboardError {
    #[error("storyboard has no shots")]
    NoShots,

    #[error("shot {shot} has invalid duration {duration}")]
    InvalidDuration { shot: usize, duration: f64 },
}
