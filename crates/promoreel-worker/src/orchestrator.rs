//! Job orchestrator: drives one job through the fixed stage sequence.
//!
//! Each stage reads the job, consults its checkpoint, does the (possibly
//! paid) work only when nothing was memoized, and commits the job with the
//! stage's progress milestone. A resumed job therefore replays every stage
//! but pays for none it already finished.
//!
//! Stage failures end the job: the [`StageError`] message is recorded,
//! the job is marked `Failed` and `run` returns [`JobOutcome::Failed`].
//! A paid result whose commit keeps failing ends the job the same way,
//! since a redelivered run would pay for it again. Other infrastructure
//! errors (repository before any paid work, scratch space) are returned to
//! the caller, leaving the job `Processing` for redelivery.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::Instrument;

use promoreel_media::{MediaToolkit, ScratchDir};
use promoreel_models::{
    clip_progress, milestones, AspectRatio, ClipKey, Job, JobId, JobStatus, Stage, Storyboard,
    VideoClip,
};
use promoreel_providers::{
    EnhanceRequest, Enhancer, GenerationOptions, MusicSelector, ProviderRegistry, ProviderResult,
    StoryboardGenerator, StoryboardRequest, VoiceGenerator,
};
use promoreel_queue::{QueueError, QueueResult};
use promoreel_storage::{keys, AssetStore};

use crate::assembly::{AssembledVideo, AssemblyPipeline, Soundtrack};
use crate::config::WorkerConfig;
use crate::error::{StageError, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::repository::JobRepository;
use crate::retry::{retry_async, RetryConfig};

/// Selling points overlaid when annotation is re-run after the storyboard.
const ANNOTATION_POINTS: usize = 3;

/// Remote and local collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineServices {
    pub enhancer: Arc<dyn Enhancer>,
    pub storyboards: Arc<dyn StoryboardGenerator>,
    pub providers: Arc<ProviderRegistry>,
    pub voice: Arc<dyn VoiceGenerator>,
    pub music: Arc<dyn MusicSelector>,
    pub toolkit: Arc<dyn MediaToolkit>,
    pub store: Arc<dyn AssetStore>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// A stage failed; the message is stored on the job
    Failed(String),
    /// The job was already completed, nothing ran
    AlreadyCompleted,
}

/// One (shot, ratio) unit of clip generation.
struct ClipUnit {
    key: ClipKey,
    image: String,
    prompt: String,
    duration: f64,
    options: GenerationOptions,
}

fn in_stage<E: Into<WorkerError>>(stage: Stage) -> impl FnOnce(E) -> WorkerError {
    move |e| StageError::new(stage, e).into()
}

/// Images the storyboard and clips animate: the best enhancement of each
/// input, or the inputs themselves when enhancement never ran.
fn animation_sources(job: &Job) -> Vec<String> {
    match job.checkpoints.effective_enhancements() {
        Some(results) => results.iter().map(|r| r.best().to_string()).collect(),
        None => job.image_urls.clone(),
    }
}

pub struct Orchestrator {
    repo: Arc<dyn JobRepository>,
    services: PipelineServices,
    assembly: AssemblyPipeline,
    max_clip_parallel: usize,
    work_dir: PathBuf,
    commit_retries: u32,
    commit_retry_delay: Duration,
}

impl Orchestrator {
    pub fn new(repo: Arc<dyn JobRepository>, services: PipelineServices, config: &WorkerConfig) -> Self {
        let assembly = AssemblyPipeline::new(
            Arc::clone(&services.toolkit),
            Arc::clone(&services.store),
            config.default_dimensions,
        );
        Self {
            repo,
            services,
            assembly,
            max_clip_parallel: config.max_clip_parallel.max(1),
            work_dir: config.work_dir.clone(),
            commit_retries: config.commit_retries,
            commit_retry_delay: config.commit_retry_delay,
        }
    }

    /// Run (or resume) a job to completion or failure.
    pub async fn run(&self, job_id: &JobId) -> WorkerResult<JobOutcome> {
        let mut job = self.repo.load(job_id).await?;
        let logger = JobLogger::new(&job.id, "marketing_video");

        if job.status == JobStatus::Completed {
            logger.log_progress("Job already completed, nothing to do");
            return Ok(JobOutcome::AlreadyCompleted);
        }

        let resumed = job.status == JobStatus::Processing;
        job.start()?;
        job.advance_progress(milestones::STARTED);
        self.repo.commit(&mut job).await?;

        metrics::record_job_started();
        let started = Instant::now();
        logger.log_start(&format!(
            "{} job with {} images for {:?}",
            if resumed { "Resuming" } else { "Starting" },
            job.image_urls.len(),
            job.aspect_ratios.iter().map(|r| r.token()).collect::<Vec<_>>()
        ));

        let scratch = ScratchDir::create(&format!("{}-", job.id), Some(&self.work_dir))?;

        let result = self
            .execute(&mut job, &scratch, &logger)
            .instrument(logger.create_span())
            .await;

        match result {
            Ok(()) => {
                metrics::record_job_completed(started.elapsed().as_secs_f64());
                logger.log_completion(&format!("Produced {} videos", job.video_urls.len()));
                Ok(JobOutcome::Completed)
            }
            Err(WorkerError::Stage(err)) => {
                let message = err.to_string();
                logger.log_error(&message);
                metrics::record_job_failed(Some(err.stage));
                job.fail(message.clone());
                self.save(&mut job, err.stage, true).await?;
                Ok(JobOutcome::Failed(message))
            }
            Err(err @ WorkerError::Unsaved { .. }) => {
                let message = err.to_string();
                logger.log_error(&message);
                metrics::record_job_failed(err.stage());
                match self.mark_failed(job_id, &message).await {
                    Ok(()) => Ok(JobOutcome::Failed(message)),
                    Err(e) => {
                        logger.log_error(&format!("Could not record failure: {e}"));
                        Err(err)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Record a terminal failure decided outside the pipeline, such as a
    /// message that ran out of deliveries. Terminal jobs are left alone.
    pub async fn mark_failed(&self, job_id: &JobId, reason: &str) -> WorkerResult<()> {
        let mut job = self.repo.load(job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.fail(reason);
        self.commit_with_retry(&mut job).await?;
        Ok(())
    }

    /// Commit the job, retrying transient repository errors in place.
    async fn commit_with_retry(&self, job: &mut Job) -> QueueResult<()> {
        let config = RetryConfig::new(format!("commit job {}", job.id))
            .with_max_retries(self.commit_retries)
            .with_base_delay(self.commit_retry_delay);
        let snapshot: &Job = job;
        let committed = retry_async(&config, || {
            let repo = Arc::clone(&self.repo);
            let mut attempt = snapshot.clone();
            async move { repo.commit(&mut attempt).await.map(|()| attempt) }
        })
        .await;

        match committed {
            Ok(saved) => {
                *job = saved;
                Ok(())
            }
            Err((e, _attempts)) => Err(e),
        }
    }

    /// Commit the job after `stage`. When the job holds a paid result that
    /// is not stored yet, a failed commit becomes [`WorkerError::Unsaved`].
    async fn save(&self, job: &mut Job, stage: Stage, holds_paid_result: bool) -> WorkerResult<()> {
        match self.commit_with_retry(job).await {
            Ok(()) => Ok(()),
            Err(source) if holds_paid_result => Err(WorkerError::Unsaved { stage, source }),
            Err(e) => Err(e.into()),
        }
    }

    async fn execute(&self, job: &mut Job, scratch: &ScratchDir, logger: &JobLogger) -> WorkerResult<()> {
        self.enhance(job, logger).await?;
        let storyboard = self.storyboard(job, logger).await?;
        self.generate_clips(job, &storyboard, logger).await?;
        let voice = self.voiceover(job, &storyboard, scratch, logger).await?;
        let music = self.select_music(job, &storyboard, logger).await?;
        let soundtrack = Soundtrack {
            voice: &voice,
            music: music.as_deref(),
        };
        let videos = self.assemble(job, &storyboard, soundtrack, scratch, logger).await?;
        self.finish(job, videos, scratch, logger).await
    }

    async fn reached(&self, job: &mut Job, stage: Stage, started: Instant, paid: bool) -> WorkerResult<()> {
        metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
        job.advance_progress(stage.completed_progress());
        self.save(job, stage, paid).await
    }

    fn checkpoint_hit(&self, stage: Stage, logger: &JobLogger) {
        metrics::record_checkpoint_hit(stage);
        logger.log_checkpoint_hit(stage);
    }

    async fn enhance(&self, job: &mut Job, logger: &JobLogger) -> WorkerResult<()> {
        let stage = Stage::Enhancement;
        let started = Instant::now();

        if job.checkpoints.enhancements().is_some() {
            self.checkpoint_hit(stage, logger);
            return self.reached(job, stage, started, false).await;
        }

        let request = EnhanceRequest {
            selling_points: job.options.selling_points.clone(),
            generate_variations: job.options.generate_variations,
        };
        let mut results = Vec::with_capacity(job.image_urls.len());
        for url in &job.image_urls {
            results.push(self.services.enhancer.enhance(url, &request).await);
        }

        let degraded = results.iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            metrics::record_enhancements_degraded(degraded as u64);
            logger.log_warning(&format!(
                "{degraded} of {} images kept their original",
                results.len()
            ));
        }

        job.checkpoints.put_enhancements(results).map_err(in_stage(stage))?;
        logger.log_stage(stage, "Images enhanced");
        self.reached(job, stage, started, true).await
    }

    async fn storyboard(&self, job: &mut Job, logger: &JobLogger) -> WorkerResult<Storyboard> {
        let stage = Stage::Storyboard;
        let started = Instant::now();

        let storyboard = match job.checkpoints.storyboard().cloned() {
            Some(storyboard) => {
                self.checkpoint_hit(stage, logger);
                storyboard
            }
            None => {
                let request = StoryboardRequest {
                    image_urls: animation_sources(job),
                    product_category: job.options.product_category.clone(),
                    selling_points: job.options.selling_points.clone(),
                };
                let storyboard = self
                    .services
                    .storyboards
                    .generate(&request)
                    .await
                    .map_err(in_stage(stage))?;
                logger.log_stage(
                    stage,
                    &format!(
                        "Storyboard with {} shots, {:.1}s",
                        storyboard.shots.len(),
                        storyboard.total_duration
                    ),
                );
                job.checkpoints
                    .put_storyboard(storyboard.clone())
                    .map_err(in_stage(stage))?;
                self.save(job, stage, true).await?;
                storyboard
            }
        };

        self.annotate(job, &storyboard, logger).await?;
        self.reached(job, stage, started, false).await?;
        Ok(storyboard)
    }

    /// Overlay the storyboard's selling points when none of the images was
    /// annotated during enhancement. Failures keep the plain enhancement.
    async fn annotate(&self, job: &mut Job, storyboard: &Storyboard, logger: &JobLogger) -> WorkerResult<()> {
        if job.checkpoints.annotations().is_some() {
            return Ok(());
        }
        let Some(enhancements) = job.checkpoints.enhancements() else {
            return Ok(());
        };
        if enhancements.iter().any(|e| e.annotated.is_some()) {
            return Ok(());
        }
        let points = storyboard.top_selling_points(ANNOTATION_POINTS);
        if points.is_empty() {
            return Ok(());
        }

        let targets: Vec<String> = enhancements.iter().map(|e| e.enhanced.clone()).collect();
        let mut annotated = Vec::with_capacity(targets.len());
        for url in &targets {
            match self.services.enhancer.annotate(url, &points).await {
                Ok(reference) => annotated.push(Some(reference)),
                Err(e) => {
                    logger.log_warning(&format!("Annotation failed, keeping enhanced image: {e}"));
                    annotated.push(None);
                }
            }
        }

        job.checkpoints
            .put_annotations(annotated)
            .map_err(in_stage(Stage::Storyboard))?;
        self.save(job, Stage::Storyboard, true).await?;
        logger.log_stage(
            Stage::Storyboard,
            &format!("Annotated {} images with {} selling points", targets.len(), points.len()),
        );
        Ok(())
    }

    fn clip_units(&self, job: &Job, storyboard: &Storyboard) -> Vec<ClipUnit> {
        let images = animation_sources(job);
        let mut units = Vec::with_capacity(storyboard.shots.len() * job.aspect_ratios.len());
        for (position, shot) in storyboard.shots.iter().enumerate() {
            let image = images
                .get(shot.image_index(position, images.len()))
                .cloned()
                .unwrap_or_default();
            let options = GenerationOptions::default()
                .with_model(job.options.video_model.clone())
                .with_duration(shot.duration_secs);
            for &aspect_ratio in &job.aspect_ratios {
                units.push(ClipUnit {
                    key: ClipKey::new(shot.index, aspect_ratio),
                    image: image.clone(),
                    prompt: shot.prompt().to_string(),
                    duration: shot.duration_secs,
                    options: options.clone(),
                });
            }
        }
        units
    }

    /// Generate every missing (shot, ratio) clip, at most
    /// `max_clip_parallel` at a time. Each success is committed as soon as
    /// it lands; after the first failure, provider or commit, nothing new
    /// starts and in-flight clips are drained and committed before the
    /// stage fails.
    async fn generate_clips(&self, job: &mut Job, storyboard: &Storyboard, logger: &JobLogger) -> WorkerResult<()> {
        let stage = Stage::ClipGeneration;
        let started = Instant::now();

        let units = self.clip_units(job, storyboard);
        let total = units.len();
        let pending: Vec<ClipUnit> = units
            .into_iter()
            .filter(|u| job.checkpoints.clip(u.key).is_none())
            .collect();
        let mut done = total - pending.len();

        if pending.is_empty() {
            self.checkpoint_hit(stage, logger);
            return self.reached(job, stage, started, false).await;
        }
        if done > 0 {
            logger.log_progress(&format!("Reusing {done} of {total} clips"));
        }

        let provider = self
            .services
            .providers
            .get(job.options.provider)
            .map_err(in_stage(stage))?;
        logger.log_stage(
            stage,
            &format!(
                "Generating {} clips with {} ({} in parallel)",
                pending.len(),
                provider.kind(),
                self.max_clip_parallel
            ),
        );

        let mut queue = pending.into_iter();
        let mut in_flight: JoinSet<(ClipUnit, ProviderResult<String>)> = JoinSet::new();
        let mut failure: Option<WorkerError> = None;
        let mut unsaved: Option<QueueError> = None;

        loop {
            while failure.is_none() && unsaved.is_none() && in_flight.len() < self.max_clip_parallel {
                let Some(unit) = queue.next() else { break };
                let provider = Arc::clone(&provider);
                in_flight.spawn(async move {
                    let result = provider
                        .generate_video(&unit.image, &unit.prompt, unit.key.aspect_ratio, &unit.options)
                        .await;
                    (unit, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok((unit, Ok(url))) => {
                    metrics::record_clip_generated(provider.kind().as_str());
                    if let Err(e) = job.checkpoints.put_clip(VideoClip::new(unit.key, url, unit.duration)) {
                        failure.get_or_insert_with(|| StageError::new(stage, e).into());
                        continue;
                    }
                    done += 1;
                    job.advance_progress(clip_progress(done, total));
                    // A later successful commit also stores clips whose own commit failed.
                    match self.commit_with_retry(job).await {
                        Ok(()) => {
                            unsaved = None;
                            logger.log_progress(&format!("Clip {} ready ({done}/{total})", unit.key));
                        }
                        Err(e) => {
                            logger.log_error(&format!("Clip {} could not be saved: {e}", unit.key));
                            unsaved = Some(e);
                        }
                    }
                }
                Ok((unit, Err(e))) => {
                    logger.log_error(&format!("Clip {} failed: {e}", unit.key));
                    failure.get_or_insert_with(|| StageError::new(stage, e).into());
                }
                Err(e) => {
                    failure.get_or_insert_with(|| {
                        StageError::new(stage, WorkerError::job_failed(format!("clip task aborted: {e}"))).into()
                    });
                }
            }
        }

        if let Some(source) = unsaved {
            return Err(WorkerError::Unsaved { stage, source });
        }
        if let Some(err) = failure {
            return Err(err);
        }
        self.reached(job, stage, started, false).await
    }

    async fn voiceover(
        &self,
        job: &mut Job,
        storyboard: &Storyboard,
        scratch: &ScratchDir,
        logger: &JobLogger,
    ) -> WorkerResult<PathBuf> {
        let stage = Stage::Voiceover;
        let started = Instant::now();
        let path = scratch.file("voiceover.mp3");

        let synthesized = match job.checkpoints.voiceover().map(str::to_string) {
            Some(url) => {
                self.checkpoint_hit(stage, logger);
                self.services
                    .store
                    .fetch(&url, &path)
                    .await
                    .map_err(in_stage(stage))?;
                false
            }
            None => {
                let narration = storyboard.narration();
                let audio = self
                    .services
                    .voice
                    .synthesize(&narration, job.options.voice_id.as_deref())
                    .await
                    .map_err(in_stage(stage))?;
                tokio::fs::write(&path, &audio).await.map_err(in_stage(stage))?;

                let key = keys::voiceover_key(&job.owner_id, job.id.as_str());
                let url = self
                    .services
                    .store
                    .put_bytes(audio, &key, "audio/mpeg")
                    .await
                    .map_err(in_stage(stage))?;
                job.checkpoints.put_voiceover(url).map_err(in_stage(stage))?;
                logger.log_stage(stage, &format!("Voiceover for {} characters", narration.len()));
                true
            }
        };

        self.reached(job, stage, started, synthesized).await?;
        Ok(path)
    }

    /// An explicit music style on the job wins; otherwise the product
    /// category and then the storyboard's suggestion decide.
    async fn select_music(&self, job: &mut Job, storyboard: &Storyboard, logger: &JobLogger) -> WorkerResult<Option<PathBuf>> {
        let stage = Stage::Music;
        let started = Instant::now();

        let selection = match job.options.music_style.as_deref() {
            Some(style) => self.services.music.select(Some(style), None),
            None => self.services.music.select(
                storyboard.music_style.as_deref(),
                job.options.product_category.as_deref(),
            ),
        };

        match &selection {
            Some(track) => logger.log_stage(
                stage,
                &format!("Selected {} track {} ({} bpm)", track.style, track.path.display(), track.bpm),
            ),
            None => logger.log_warning("No music track available, mixing voiceover only"),
        }

        self.reached(job, stage, started, false).await?;
        Ok(selection.map(|s| s.path))
    }

    async fn assemble(
        &self,
        job: &mut Job,
        storyboard: &Storyboard,
        soundtrack: Soundtrack<'_>,
        scratch: &ScratchDir,
        logger: &JobLogger,
    ) -> WorkerResult<Vec<AssembledVideo>> {
        let stage = Stage::Assembly;
        let started = Instant::now();

        let ratios: Vec<AspectRatio> = job.aspect_ratios.clone();
        let mut videos = Vec::with_capacity(ratios.len());
        for aspect_ratio in ratios {
            let video = self
                .assembly
                .assemble(job, storyboard, aspect_ratio, soundtrack, scratch)
                .await
                .map_err(in_stage(stage))?;
            logger.log_stage(stage, &format!("{aspect_ratio} uploaded to {}", video.url));
            videos.push(video);
        }

        self.reached(job, stage, started, false).await?;
        Ok(videos)
    }

    /// Thumbnail from the first video, then publish every output at once.
    async fn finish(
        &self,
        job: &mut Job,
        videos: Vec<AssembledVideo>,
        scratch: &ScratchDir,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let started = Instant::now();

        let thumbnail = match videos.first() {
            Some(first) => Some(
                self.assembly
                    .thumbnail(job, &first.path, scratch)
                    .await
                    .map_err(in_stage(Stage::Thumbnail))?,
            ),
            None => None,
        };
        metrics::record_stage_duration(Stage::Thumbnail, started.elapsed().as_secs_f64());

        let outputs: HashMap<AspectRatio, String> =
            videos.into_iter().map(|v| (v.aspect_ratio, v.url)).collect();
        for (aspect_ratio, url) in outputs {
            job.set_output(aspect_ratio, url);
        }
        job.thumbnail_url = thumbnail;
        job.complete().map_err(in_stage(Stage::Assembly))?;
        self.save(job, Stage::Thumbnail, false).await?;

        if let Some(url) = &job.thumbnail_url {
            logger.log_stage(Stage::Thumbnail, &format!("Thumbnail at {url}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_support::{FlakyRepository, Harness, MediaOp, ASSET_BASE};
    use promoreel_media::SubtitleCue;
    use promoreel_models::{Dimensions, JobOptions, SubtitleStyle};

    const IMAGE: &str = "https://cdn.example.com/p.jpg";

    #[tokio::test]
    async fn test_single_image_single_ratio_completes() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;

        let outcome = h.orchestrator(1).run(&job.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed);

        let job = h.repo.load(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.video_urls.len(), 1);
        assert_eq!(
            job.video_urls[&AspectRatio::LANDSCAPE],
            format!("{ASSET_BASE}/{}", keys::video_key("user-1", job.id.as_str(), AspectRatio::LANDSCAPE))
        );
        assert_eq!(
            job.thumbnail_url.as_deref(),
            Some(format!("{ASSET_BASE}/{}", keys::thumbnail_key("user-1", job.id.as_str())).as_str())
        );
        assert!(job.error_message.is_none());
        assert_eq!(h.provider.call_count(), 3);
        assert_eq!(h.voice.texts.lock().unwrap()[0], "Line 1 Line 2 Line 3");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_completion() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE, AspectRatio::PORTRAIT], JobOptions::default())
            .await;

        h.orchestrator(1).run(&job.id).await.unwrap();

        let history = h.repo.history(&job.id);
        assert!(history.windows(2).all(|w| w[0].1 <= w[1].1), "{history:?}");
        for (status, progress) in &history {
            if *progress == 100 {
                assert_eq!(*status, JobStatus::Completed);
            }
        }
        assert_eq!(history.last(), Some(&(JobStatus::Completed, 100)));

        let milestones: Vec<u8> = history.iter().map(|(_, p)| *p).collect();
        for expected in [10, 20, 30, 50, 60, 70, 90, 100] {
            assert!(milestones.contains(&expected), "missing {expected} in {milestones:?}");
        }
    }

    #[tokio::test]
    async fn test_resume_after_failure_does_not_repeat_paid_calls() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE, "https://cdn.example.com/q.jpg"], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;

        h.voice.fail.store(true, Ordering::SeqCst);
        let outcome = h.orchestrator(1).run(&job.id).await.unwrap();
        let JobOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.starts_with("voiceover failed:"), "{message}");

        let mut failed = h.repo.load(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some(message.as_str()));
        assert!(failed.video_urls.is_empty());
        assert_eq!(failed.progress, milestones::CLIPS_GENERATED);

        failed.resubmit().unwrap();
        h.repo.commit(&mut failed).await.unwrap();
        h.voice.fail.store(false, Ordering::SeqCst);

        let outcome = h.orchestrator(1).run(&job.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed);

        assert_eq!(h.enhancer.enhance_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.storyboards.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.provider.call_count(), 3);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 2);

        let history = h.repo.history(&job.id);
        assert!(history.contains(&(JobStatus::Failed, milestones::CLIPS_GENERATED)));
    }

    #[tokio::test]
    async fn test_clip_failure_keeps_finished_clips() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;

        h.provider.fail_from.store(2, Ordering::SeqCst);
        let outcome = h.orchestrator(1).run(&job.id).await.unwrap();
        let JobOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.starts_with("clip_generation failed:"), "{message}");
        assert!(message.contains("content rejected"));

        let mut failed = h.repo.load(&job.id).await.unwrap();
        assert_eq!(failed.checkpoints.clip_count(), 2);
        assert!(failed.progress > milestones::STORYBOARDED);
        assert!(failed.progress < milestones::CLIPS_GENERATED);

        failed.resubmit().unwrap();
        h.repo.commit(&mut failed).await.unwrap();
        h.provider.fail_from.store(usize::MAX, Ordering::SeqCst);

        assert_eq!(h.orchestrator(1).run(&job.id).await.unwrap(), JobOutcome::Completed);
        assert_eq!(h.provider.call_count(), 4);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parallel_clip_failure_drains_in_flight() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE, AspectRatio::PORTRAIT], JobOptions::default())
            .await;

        h.provider.fail_from.store(0, Ordering::SeqCst);
        let outcome = h.orchestrator(3).run(&job.id).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed(_)));

        // The first batch of three started before the failure was seen.
        assert_eq!(h.provider.call_count(), 3);
        let failed = h.repo.load(&job.id).await.unwrap();
        assert_eq!(failed.checkpoints.clip_count(), 0);
    }

    #[tokio::test]
    async fn test_parallel_clip_generation_covers_every_pair() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE, AspectRatio::PORTRAIT], JobOptions::default())
            .await;

        assert_eq!(h.orchestrator(4).run(&job.id).await.unwrap(), JobOutcome::Completed);

        let job = h.repo.load(&job.id).await.unwrap();
        assert_eq!(job.checkpoints.clip_count(), 6);
        for ratio in [AspectRatio::LANDSCAPE, AspectRatio::PORTRAIT] {
            let shots: Vec<u32> = job.checkpoints.clips_for(ratio).iter().map(|c| c.shot).collect();
            assert_eq!(shots, vec![1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn test_every_ratio_is_rendered() {
        let h = Harness::new(&[3.0, 4.0]);
        let ratios = [AspectRatio::LANDSCAPE, AspectRatio::PORTRAIT, AspectRatio::CLASSIC];
        let options = JobOptions {
            output_dimensions: [(AspectRatio::CLASSIC, Dimensions { width: 1440, height: 1080 })]
                .into_iter()
                .collect(),
            ..JobOptions::default()
        };
        let job = h.create_job(&[IMAGE], &ratios, options).await;

        assert_eq!(h.orchestrator(1).run(&job.id).await.unwrap(), JobOutcome::Completed);

        let job = h.repo.load(&job.id).await.unwrap();
        assert!(job.missing_outputs().is_empty());
        assert_eq!(h.provider.call_count(), 6);

        let frames: Vec<MediaOp> = h
            .toolkit
            .ops()
            .into_iter()
            .filter(|op| matches!(op, MediaOp::ResizePad(..)))
            .collect();
        assert_eq!(
            frames,
            vec![
                MediaOp::ResizePad(1920, 1080),
                MediaOp::ResizePad(1080, 1920),
                MediaOp::ResizePad(1440, 1080),
            ]
        );
        let thumbnails = h.toolkit.ops().iter().filter(|op| **op == MediaOp::Frame).count();
        assert_eq!(thumbnails, 1);
    }

    #[tokio::test]
    async fn test_subtitles_follow_shot_durations() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let options = JobOptions {
            subtitle_style: SubtitleStyle::Default,
            ..JobOptions::default()
        };
        let job = h.create_job(&[IMAGE], &[AspectRatio::SQUARE], options).await;

        h.orchestrator(1).run(&job.id).await.unwrap();

        let cues = h
            .toolkit
            .ops()
            .into_iter()
            .find_map(|op| match op {
                MediaOp::Subtitles(cues, style) => Some((cues, style)),
                _ => None,
            })
            .unwrap();
        assert_eq!(cues.1, SubtitleStyle::Default);
        assert_eq!(
            cues.0[1],
            SubtitleCue {
                text: "Line 2".into(),
                start: 3.0,
                end: 7.0
            }
        );
    }

    #[tokio::test]
    async fn test_enhancement_failure_degrades_to_original() {
        let h = Harness::new(&[3.0]);
        h.enhancer.fail.store(true, Ordering::SeqCst);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;

        assert_eq!(h.orchestrator(1).run(&job.id).await.unwrap(), JobOutcome::Completed);

        let job = h.repo.load(&job.id).await.unwrap();
        let enhancements = job.checkpoints.enhancements().unwrap();
        assert!(enhancements[0].is_degraded());
        assert_eq!(h.storyboards.requests.lock().unwrap()[0].image_urls, vec![IMAGE]);
        assert_eq!(h.provider.calls.lock().unwrap()[0].image, IMAGE);
    }

    #[tokio::test]
    async fn test_selling_points_from_storyboard_are_annotated_once() {
        let mut storyboards = crate::test_support::FakeStoryboards::new(&[3.0, 3.0]);
        storyboards.selling_points = vec!["Fast".into(), "Quiet".into(), "Cheap".into(), "Small".into()];
        let h = Harness::with_storyboards(storyboards);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;

        h.voice.fail.store(true, Ordering::SeqCst);
        h.orchestrator(1).run(&job.id).await.unwrap();
        assert_eq!(h.enhancer.annotate_calls.load(Ordering::SeqCst), 1);

        let expected = format!("{IMAGE}?enhanced&annotated");
        assert!(h.provider.calls.lock().unwrap().iter().all(|c| c.image == expected));

        let mut failed = h.repo.load(&job.id).await.unwrap();
        failed.resubmit().unwrap();
        h.repo.commit(&mut failed).await.unwrap();
        h.voice.fail.store(false, Ordering::SeqCst);

        assert_eq!(h.orchestrator(1).run(&job.id).await.unwrap(), JobOutcome::Completed);
        assert_eq!(h.enhancer.annotate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_images_annotated_during_enhancement_are_not_reannotated() {
        let mut storyboards = crate::test_support::FakeStoryboards::new(&[3.0]);
        storyboards.selling_points = vec!["Fast".into()];
        let h = Harness::with_storyboards(storyboards);
        let options = JobOptions {
            selling_points: vec!["Waterproof".into()],
            ..JobOptions::default()
        };
        let job = h.create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], options).await;

        h.orchestrator(1).run(&job.id).await.unwrap();

        assert_eq!(h.enhancer.annotate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.provider.calls.lock().unwrap()[0].image, format!("{IMAGE}?overlay"));
    }

    #[tokio::test]
    async fn test_music_style_override() {
        let h = Harness::new(&[3.0]);
        let options = JobOptions {
            music_style: Some("calm".into()),
            product_category: Some("electronics".into()),
            ..JobOptions::default()
        };
        let job = h.create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], options).await;

        h.orchestrator(1).run(&job.id).await.unwrap();

        assert_eq!(
            h.music.requests.lock().unwrap()[0],
            (Some("calm".to_string()), None)
        );
        // No track in the fake library: voiceover only.
        assert!(h
            .toolkit
            .ops()
            .contains(&MediaOp::Mix { music: false, volume: promoreel_media::DEFAULT_MUSIC_VOLUME }));
    }

    #[tokio::test]
    async fn test_failed_job_is_rejected_until_resubmitted() {
        let h = Harness::new(&[3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        let mut stored = h.repo.load(&job.id).await.unwrap();
        stored.fail("storyboard failed: boom");
        h.repo.commit(&mut stored).await.unwrap();

        let err = h.orchestrator(1).run(&job.id).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobState(_)));
        assert!(!err.is_retryable());
        assert_eq!(h.enhancer.enhance_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completed_job_is_a_no_op() {
        let h = Harness::new(&[3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        let orchestrator = h.orchestrator(1);
        assert_eq!(orchestrator.run(&job.id).await.unwrap(), JobOutcome::Completed);

        assert_eq!(orchestrator.run(&job.id).await.unwrap(), JobOutcome::AlreadyCompleted);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(h.storyboards.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mark_failed_skips_terminal_jobs() {
        let h = Harness::new(&[3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        let orchestrator = h.orchestrator(1);

        orchestrator.mark_failed(&job.id, "Job failed after 3 attempts").await.unwrap();
        let failed = h.repo.load(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("Job failed after 3 attempts"));

        orchestrator.mark_failed(&job.id, "again").await.unwrap();
        let unchanged = h.repo.load(&job.id).await.unwrap();
        assert_eq!(unchanged.version, failed.version);
    }

    #[tokio::test]
    async fn test_resume_downloads_saved_voiceover() {
        let h = Harness::new(&[3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;

        // Simulate a crash after the voiceover checkpoint.
        let mut stored = h.repo.load(&job.id).await.unwrap();
        stored.start().unwrap();
        stored
            .checkpoints
            .put_voiceover(format!("{ASSET_BASE}/saved.mp3"))
            .unwrap();
        h.repo.commit(&mut stored).await.unwrap();

        assert_eq!(h.orchestrator(1).run(&job.id).await.unwrap(), JobOutcome::Completed);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.fetches().contains(&format!("{ASSET_BASE}/saved.mp3")));
    }

    #[tokio::test]
    async fn test_commit_blip_after_voiceover_is_retried_in_place() {
        let h = Harness::new(&[3.0, 4.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        let repo = Arc::new(FlakyRepository::new(h.repo.clone(), 2, |job: &Job| {
            job.checkpoints.voiceover().is_some()
        }));
        let orchestrator = h.orchestrator_with_repo(1, repo.clone());

        assert_eq!(orchestrator.run(&job.id).await.unwrap(), JobOutcome::Completed);
        assert_eq!(repo.failed_commits.load(Ordering::SeqCst), 2);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 1);

        assert_eq!(orchestrator.run(&job.id).await.unwrap(), JobOutcome::AlreadyCompleted);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unsaved_voiceover_fails_job_instead_of_paying_twice() {
        let h = Harness::new(&[3.0, 4.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        let repo = Arc::new(FlakyRepository::new(h.repo.clone(), usize::MAX, |job: &Job| {
            job.checkpoints.voiceover().is_some()
        }));
        let orchestrator = h.orchestrator_with_repo(1, repo.clone());

        let outcome = orchestrator.run(&job.id).await.unwrap();
        let JobOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.starts_with("voiceover failed: result could not be saved:"), "{message}");
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 1);

        let mut failed = h.repo.load(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.checkpoints.voiceover().is_none());
        assert_eq!(failed.checkpoints.clip_count(), 2);

        // Delivering the message again must not reach the voice provider.
        let err = orchestrator.run(&job.id).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 1);

        failed.resubmit().unwrap();
        h.repo.commit(&mut failed).await.unwrap();
        assert_eq!(h.orchestrator(1).run(&job.id).await.unwrap(), JobOutcome::Completed);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unsaved_clip_drains_in_flight_clips() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        h.provider.delay_ms.store(20, Ordering::SeqCst);
        let repo = Arc::new(FlakyRepository::new(h.repo.clone(), usize::MAX, |job: &Job| {
            job.checkpoints.clip_count() > 0
        }));

        let outcome = h.orchestrator_with_repo(3, repo.clone()).run(&job.id).await.unwrap();
        let JobOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.starts_with("clip_generation failed: result could not be saved:"), "{message}");

        // Every started clip ran to the end and was offered to the repository.
        assert_eq!(h.provider.call_count(), 3);
        assert_eq!(h.provider.finished.load(Ordering::SeqCst), 3);
        assert_eq!(repo.failed_commits.load(Ordering::SeqCst), 3 * 4);

        let failed = h.repo.load(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(h.voice.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_later_clip_commit_saves_earlier_unsaved_clip() {
        let h = Harness::new(&[3.0, 4.0, 3.0]);
        let job = h
            .create_job(&[IMAGE], &[AspectRatio::LANDSCAPE], JobOptions::default())
            .await;
        h.provider.delay_ms.store(20, Ordering::SeqCst);
        // Every attempt to store the first clip alone fails.
        let repo = Arc::new(FlakyRepository::new(h.repo.clone(), 4, |job: &Job| {
            job.checkpoints.clip_count() == 1
        }));

        let outcome = h.orchestrator_with_repo(2, repo.clone()).run(&job.id).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(repo.failed_commits.load(Ordering::SeqCst), 4);
        assert_eq!(h.provider.call_count(), 3);

        let job = h.repo.load(&job.id).await.unwrap();
        assert_eq!(job.checkpoints.clip_count(), 3);
    }
}
