//! Background music selection from a static track library.

use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    pub file: &'static str,
    pub bpm: u32,
}

const ENERGETIC: &[Track] = &[
    Track { file: "energetic_1.mp3", bpm: 120 },
    Track { file: "energetic_2.mp3", bpm: 128 },
];
const CALM: &[Track] = &[
    Track { file: "calm_1.mp3", bpm: 90 },
    Track { file: "calm_2.mp3", bpm: 85 },
];
const MODERN: &[Track] = &[
    Track { file: "modern_1.mp3", bpm: 110 },
    Track { file: "modern_2.mp3", bpm: 115 },
];

pub const DEFAULT_STYLE: &str = "energetic";

/// Music style for a product category.
pub fn style_for_category(category: &str) -> &'static str {
    match category.trim().to_lowercase().as_str() {
        "electronics" => "modern",
        "beauty" | "home" => "calm",
        _ => DEFAULT_STYLE,
    }
}

fn tracks_for(style: &str) -> &'static [Track] {
    match style.trim().to_lowercase().as_str() {
        "calm" => CALM,
        "modern" => MODERN,
        _ => ENERGETIC,
    }
}

/// A chosen track on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicSelection {
    pub path: PathBuf,
    pub style: &'static str,
    pub bpm: u32,
}

pub trait MusicSelector: Send + Sync {
    /// Pick a track. A category, when given, wins over the style.
    /// `None` means the job gets no music.
    fn select(&self, style: Option<&str>, category: Option<&str>) -> Option<MusicSelection>;
}

/// Track library rooted at a directory.
#[derive(Debug, Clone)]
pub struct MusicLibrary {
    root: PathBuf,
}

impl MusicLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MusicSelector for MusicLibrary {
    fn select(&self, style: Option<&str>, category: Option<&str>) -> Option<MusicSelection> {
        let style = match category.filter(|c| !c.trim().is_empty()) {
            Some(category) => style_for_category(category),
            None => match style.map(|s| s.trim().to_lowercase()).as_deref() {
                Some("calm") => "calm",
                Some("modern") => "modern",
                _ => DEFAULT_STYLE,
            },
        };

        let track = tracks_for(style).choose(&mut rand::rng())?;
        let path = self.root.join(track.file);
        if !path.is_file() {
            warn!(path = %path.display(), "Music track missing, continuing without music");
            return None;
        }

        debug!(style, bpm = track.bpm, path = %path.display(), "Selected music");
        Some(MusicSelection {
            path,
            style,
            bpm: track.bpm,
        })
    }
}
