//! Generated video clip records.

use serde::{Deserialize, Serialize};

use crate::AspectRatio;

/// Identity of one unit of clip generation: a shot rendered at a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipKey {
    /// 1-based shot index
    pub shot: u32,
    pub aspect_ratio: AspectRatio,
}

impl ClipKey {
    pub fn new(shot: u32, aspect_ratio: AspectRatio) -> Self {
        Self { shot, aspect_ratio }
    }
}

impl std::fmt::Display for ClipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shot {} @ {}", self.shot, self.aspect_ratio)
    }
}

/// A provider-generated clip for one shot at one aspect ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    /// 1-based shot index
    pub shot: u32,
    pub aspect_ratio: AspectRatio,
    /// Remote reference returned by the provider
    pub url: String,
    /// Duration in seconds, taken from the shot
    pub duration: f64,
}

impl VideoClip {
    pub fn new(key: ClipKey, url: impl Into<String>, duration: f64) -> Self {
        Self {
            shot: key.shot,
            aspect_ratio: key.aspect_ratio,
            url: url.into(),
            duration,
        }
    }

    pub fn key(&self) -> ClipKey {
        ClipKey::new(self.shot, self.aspect_ratio)
    }
}
