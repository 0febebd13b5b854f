//! Subtitle cue timing and SRT rendering.

use std::fmt::Write as _;
use std::path::Path;

use promoreel_models::Storyboard;

use crate::error::MediaResult;

/// One subtitle cue, in seconds from the start of the video.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Cues back to back: each starts where the previous one ended.
pub fn cues_from_durations<I, S>(shots: I) -> Vec<SubtitleCue>
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    let mut elapsed = 0.0;
    shots
        .into_iter()
        .map(|(text, duration)| {
            let start = elapsed;
            elapsed += duration;
            SubtitleCue {
                text: text.into(),
                start,
                end: elapsed,
            }
        })
        .collect()
}

/// Cues for every shot of a storyboard, in shot order.
pub fn storyboard_cues(storyboard: &Storyboard) -> Vec<SubtitleCue> {
    cues_from_durations(
        storyboard
            .shots
            .iter()
            .map(|s| (s.text.clone(), s.duration_secs)),
    )
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Render cues as an SRT document.
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(cue.start),
            format_srt_timestamp(cue.end),
            cue.text.trim()
        );
    }
    out
}

pub async fn write_srt(cues: &[SubtitleCue], path: impl AsRef<Path>) -> MediaResult<()> {
    tokio::fs::write(path, render_srt(cues)).await?;
    Ok(())
}
