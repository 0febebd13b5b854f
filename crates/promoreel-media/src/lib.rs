//! FFmpeg CLI wrapper for marketing video assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Per-invocation timeouts via tokio
//! - The `MediaToolkit` operations: concat, subtitles, audio mix, resize/pad, frame grab
//! - SRT subtitle timing and rendering
//! - Per-job scratch directories

pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod progress;
pub mod subtitles;
pub mod toolkit;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use filters::DEFAULT_MUSIC_VOLUME;
pub use fs_utils::ScratchDir;
pub use progress::FfmpegProgress;
pub use subtitles::{cues_from_durations, render_srt, storyboard_cues, SubtitleCue};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
