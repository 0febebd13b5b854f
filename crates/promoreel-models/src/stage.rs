//! Pipeline stages and their progress milestones.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress at each milestone of the pipeline.
pub mod milestones {
    pub const STARTED: u8 = 10;
    pub const ENHANCED: u8 = 20;
    pub const STORYBOARDED: u8 = 30;
    pub const CLIPS_GENERATED: u8 = 50;
    pub const VOICED: u8 = 60;
    pub const MUSIC_SELECTED: u8 = 70;
    pub const ASSEMBLED: u8 = 90;
    pub const COMPLETED: u8 = 100;
}

/// Ordered stages of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Enhancement,
    Storyboard,
    ClipGeneration,
    Voiceover,
    Music,
    Assembly,
    Thumbnail,
}

impl Stage {
    pub const ALL: &'static [Stage] = &[
        Stage::Enhancement,
        Stage::Storyboard,
        Stage::ClipGeneration,
        Stage::Voiceover,
        Stage::Music,
        Stage::Assembly,
        Stage::Thumbnail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Enhancement => "enhancement",
            Stage::Storyboard => "storyboard",
            Stage::ClipGeneration => "clip_generation",
            Stage::Voiceover => "voiceover",
            Stage::Music => "music",
            Stage::Assembly => "assembly",
            Stage::Thumbnail => "thumbnail",
        }
    }

    /// Whether this stage calls a paid remote service.
    pub fn is_metered(&self) -> bool {
        matches!(
            self,
            Stage::Enhancement | Stage::Storyboard | Stage::ClipGeneration | Stage::Voiceover
        )
    }

    /// Progress recorded once the stage finishes.
    pub fn completed_progress(&self) -> u8 {
        match self {
            Stage::Enhancement => milestones::ENHANCED,
            Stage::Storyboard => milestones::STORYBOARDED,
            Stage::ClipGeneration => milestones::CLIPS_GENERATED,
            Stage::Voiceover => milestones::VOICED,
            Stage::Music => milestones::MUSIC_SELECTED,
            Stage::Assembly => milestones::ASSEMBLED,
            Stage::Thumbnail => milestones::ASSEMBLED,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress between the storyboard and clip milestones after `done` of
/// `total` clips.
pub fn clip_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return milestones::CLIPS_GENERATED;
    }
    let span = (milestones::CLIPS_GENERATED - milestones::STORYBOARDED) as usize;
    milestones::STORYBOARDED + (done.min(total) * span / total) as u8
}
