//! Media toolkit: the audio/video operations the assembly pipeline needs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use promoreel_models::SubtitleStyle;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{filter_resize_pad, filter_subtitles, filter_voice_music_mix};
use crate::fs_utils::{ensure_exists, write_concat_list};
use crate::subtitles::{write_srt, SubtitleCue};

/// Operations used to assemble a final video. Every operation writes to
/// `output` and returns it.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Join clips end to end, in the given order.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf>;

    /// Burn subtitle cues into the video.
    async fn burn_subtitles(
        &self,
        video: &Path,
        cues: &[SubtitleCue],
        style: SubtitleStyle,
        output: &Path,
    ) -> MediaResult<PathBuf>;

    /// Replace the audio track with the voiceover, optionally mixed with music.
    async fn mix_audio(
        &self,
        video: &Path,
        voice: &Path,
        music: Option<&Path>,
        music_volume: f32,
        output: &Path,
    ) -> MediaResult<PathBuf>;

    /// Fit the video into an exact frame, padding with black.
    async fn resize_pad(&self, video: &Path, width: u32, height: u32, output: &Path) -> MediaResult<PathBuf>;

    /// Grab a single frame as an image.
    async fn extract_frame(&self, video: &Path, output: &Path) -> MediaResult<PathBuf>;
}

/// `MediaToolkit` backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    runner: FfmpegRunner,
}

impl FfmpegToolkit {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    async fn run(&self, operation: &'static str, cmd: FfmpegCommand) -> MediaResult<PathBuf> {
        let start = Instant::now();
        let result = self.runner.run(&cmd).await;
        let elapsed = start.elapsed().as_secs_f64();

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::histogram!(
            "promoreel_ffmpeg_duration_seconds",
            "operation" => operation,
            "status" => status
        )
        .record(elapsed);

        result?;
        debug!(operation, elapsed_secs = elapsed, "FFmpeg step finished");
        Ok(cmd.output_path().to_path_buf())
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }
        for clip in clips {
            ensure_exists(clip).await?;
        }

        let list_path = output.with_extension("concat.txt");
        write_concat_list(clips, &list_path).await?;
        info!("Concatenating {} clips into {}", clips.len(), output.display());

        let cmd = FfmpegCommand::new(&list_path, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .video_codec("libx264")
            .audio_codec("aac");
        self.run("concat", cmd).await
    }

    async fn burn_subtitles(
        &self,
        video: &Path,
        cues: &[SubtitleCue],
        style: SubtitleStyle,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        ensure_exists(video).await?;
        if cues.is_empty() {
            tokio::fs::copy(video, output).await?;
            return Ok(output.to_path_buf());
        }

        let srt_path = output.with_extension("srt");
        write_srt(cues, &srt_path).await?;

        let cmd = FfmpegCommand::new(video, output)
            .video_filter(filter_subtitles(&srt_path, style))
            .video_codec("libx264")
            .audio_codec("copy");
        self.run("burn_subtitles", cmd).await
    }

    async fn mix_audio(
        &self,
        video: &Path,
        voice: &Path,
        music: Option<&Path>,
        music_volume: f32,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        ensure_exists(video).await?;
        ensure_exists(voice).await?;

        let cmd = FfmpegCommand::new(video, output).add_input(voice);
        let cmd = match music {
            Some(music) => {
                ensure_exists(music).await?;
                cmd.add_input(music)
                    .filter_complex(filter_voice_music_mix(music_volume))
                    .map("0:v")
                    .map("[a]")
            }
            None => cmd.map("0:v").map("1:a"),
        };
        let cmd = cmd.video_codec("copy").audio_codec("aac");
        self.run("mix_audio", cmd).await
    }

    async fn resize_pad(&self, video: &Path, width: u32, height: u32, output: &Path) -> MediaResult<PathBuf> {
        ensure_exists(video).await?;
        if width == 0 || height == 0 {
            return Err(MediaError::invalid_input(format!(
                "target frame {}x{} has a zero dimension",
                width, height
            )));
        }

        let cmd = FfmpegCommand::new(video, output)
            .video_filter(filter_resize_pad(width, height))
            .video_codec("libx264")
            .audio_codec("copy");
        self.run("resize_pad", cmd).await
    }

    async fn extract_frame(&self, video: &Path, output: &Path) -> MediaResult<PathBuf> {
        ensure_exists(video).await?;
        let cmd = FfmpegCommand::new(video, output).single_frame();
        self.run("extract_frame", cmd).await
    }
}
