//! Media assembly: turns a ratio's clips, the voiceover and the music bed
//! into one uploaded video.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use promoreel_media::{storyboard_cues, MediaToolkit, ScratchDir, DEFAULT_MUSIC_VOLUME};
use promoreel_models::{AspectRatio, Dimensions, Job, Storyboard, VideoClip};
use promoreel_storage::{keys, AssetStore};

use crate::error::{WorkerError, WorkerResult};

/// Audio shared by every ratio of a job.
#[derive(Debug, Clone, Copy)]
pub struct Soundtrack<'a> {
    pub voice: &'a Path,
    pub music: Option<&'a Path>,
}

/// A rendered and uploaded output.
#[derive(Debug, Clone)]
pub struct AssembledVideo {
    pub aspect_ratio: AspectRatio,
    /// Final file in the scratch directory
    pub path: PathBuf,
    /// Public reference of the upload
    pub url: String,
}

pub struct AssemblyPipeline {
    toolkit: Arc<dyn MediaToolkit>,
    store: Arc<dyn AssetStore>,
    default_dimensions: Dimensions,
}

impl AssemblyPipeline {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        store: Arc<dyn AssetStore>,
        default_dimensions: Dimensions,
    ) -> Self {
        Self {
            toolkit,
            store,
            default_dimensions,
        }
    }

    /// Render one ratio: concatenate, subtitle, mix audio, fit to frame, upload.
    pub async fn assemble(
        &self,
        job: &Job,
        storyboard: &Storyboard,
        aspect_ratio: AspectRatio,
        soundtrack: Soundtrack<'_>,
        scratch: &ScratchDir,
    ) -> WorkerResult<AssembledVideo> {
        let started = Instant::now();
        let clips = job.checkpoints.clips_for(aspect_ratio);
        if clips.len() != storyboard.shots.len() {
            return Err(WorkerError::job_failed(format!(
                "expected {} clips for {}, found {}",
                storyboard.shots.len(),
                aspect_ratio,
                clips.len()
            )));
        }

        let dir = scratch.file(aspect_ratio.as_filename_part());
        tokio::fs::create_dir_all(&dir).await?;

        let sources = self.fetch_clips(&clips, &dir).await?;

        let joined = self.toolkit.concat(&sources, &dir.join("joined.mp4")).await?;

        let cues = storyboard_cues(storyboard);
        let subtitled = self
            .toolkit
            .burn_subtitles(
                &joined,
                &cues,
                job.options.subtitle_style,
                &dir.join("subtitled.mp4"),
            )
            .await?;

        let mixed = self
            .toolkit
            .mix_audio(
                &subtitled,
                soundtrack.voice,
                soundtrack.music,
                DEFAULT_MUSIC_VOLUME,
                &dir.join("mixed.mp4"),
            )
            .await?;

        let frame = job.options.dimensions_for(aspect_ratio, self.default_dimensions);
        let path = self
            .toolkit
            .resize_pad(&mixed, frame.width, frame.height, &dir.join("final.mp4"))
            .await?;

        let key = keys::video_key(&job.owner_id, job.id.as_str(), aspect_ratio);
        let url = self.store.put_file(&path, &key, "video/mp4").await?;

        info!(
            job_id = %job.id,
            aspect_ratio = %aspect_ratio,
            width = frame.width,
            height = frame.height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assembled video"
        );

        Ok(AssembledVideo {
            aspect_ratio,
            path,
            url,
        })
    }

    async fn fetch_clips(&self, clips: &[&VideoClip], dir: &Path) -> WorkerResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(clips.len());
        for clip in clips {
            let dest = dir.join(format!("clip_{:02}.mp4", clip.shot));
            self.store.fetch(&clip.url, &dest).await?;
            debug!(shot = clip.shot, dest = %dest.display(), "Fetched clip");
            paths.push(dest);
        }
        Ok(paths)
    }

    /// Grab a frame from a rendered video and upload it as the job thumbnail.
    pub async fn thumbnail(&self, job: &Job, video: &Path, scratch: &ScratchDir) -> WorkerResult<String> {
        let frame = self
            .toolkit
            .extract_frame(video, &scratch.file("thumbnail.jpg"))
            .await?;
        let key = keys::thumbnail_key(&job.owner_id, job.id.as_str());
        Ok(self.store.put_file(&frame, &key, "image/jpeg").await?)
    }
}
