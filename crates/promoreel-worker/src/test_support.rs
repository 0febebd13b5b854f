//! In-memory fakes of every pipeline collaborator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use promoreel_media::{MediaResult, MediaToolkit, SubtitleCue};
use promoreel_models::{
    AspectRatio, EnhancementResult, ImageRef, Job, JobOptions, ProviderKind, Shot, Storyboard,
    SubtitleStyle,
};
use promoreel_providers::{
    EnhanceRequest, Enhancer, GenerationOptions, MusicSelection, MusicSelector, ProviderError,
    ProviderRegistry, ProviderResult, StoryboardGenerator, StoryboardRequest, VideoProvider,
    VoiceGenerator,
};
use promoreel_queue::{QueueError, QueueResult};
use promoreel_storage::{AssetStore, StorageResult};

use crate::config::WorkerConfig;
use crate::orchestrator::{Orchestrator, PipelineServices};
use crate::repository::{InMemoryJobRepository, JobRepository};

pub const ASSET_BASE: &str = "https://assets.example.com";

#[derive(Default)]
pub struct FakeEnhancer {
    pub enhance_calls: AtomicUsize,
    pub annotate_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub requests: Mutex<Vec<EnhanceRequest>>,
}

#[async_trait]
impl Enhancer for FakeEnhancer {
    async fn enhance(&self, image_url: &str, request: &EnhanceRequest) -> EnhancementResult {
        self.enhance_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return EnhancementResult::fallback(image_url, Some("enhancer unavailable".into()));
        }
        let mut result = EnhancementResult::fallback(image_url, None);
        result.enhanced = format!("{image_url}?enhanced");
        if !request.selling_points.is_empty() {
            result.annotated = Some(format!("{image_url}?overlay"));
        }
        result
    }

    async fn annotate(&self, image_url: &str, _selling_points: &[String]) -> ProviderResult<String> {
        self.annotate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{image_url}&annotated"))
    }
}

pub struct FakeStoryboards {
    pub calls: AtomicUsize,
    pub durations: Vec<f64>,
    pub selling_points: Vec<String>,
    pub requests: Mutex<Vec<StoryboardRequest>>,
}

impl FakeStoryboards {
    pub fn new(durations: &[f64]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            durations: durations.to_vec(),
            selling_points: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StoryboardGenerator for FakeStoryboards {
    async fn generate(&self, request: &StoryboardRequest) -> ProviderResult<Storyboard> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let shots = self
            .durations
            .iter()
            .enumerate()
            .map(|(i, d)| Shot {
                index: i as u32 + 1,
                image: ImageRef::Index(i),
                text: format!("Line {}", i + 1),
                duration_secs: *d,
                hook: i == 0,
                selling_points: Vec::new(),
                cta: String::new(),
                motion_prompt: None,
            })
            .collect();
        let storyboard = Storyboard {
            shots,
            hook_text: "Line 1".into(),
            main_selling_points: self.selling_points.clone(),
            final_cta: "Shop now".into(),
            total_duration: 0.0,
            music_style: None,
        };
        storyboard
            .normalize()
            .map_err(|e| ProviderError::inconsistent(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoCall {
    pub image: String,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
}

/// Synchronous provider; calls numbered from `fail_from` onwards fail.
/// `delay_ms` holds every call open before it answers.
pub struct FakeVideoProvider {
    pub calls: Mutex<Vec<VideoCall>>,
    pub fail_from: AtomicUsize,
    pub delay_ms: AtomicU64,
    /// Calls that ran to the end without being cancelled
    pub finished: AtomicUsize,
}

impl Default for FakeVideoProvider {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_from: AtomicUsize::new(usize::MAX),
            delay_ms: AtomicU64::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

impl FakeVideoProvider {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoProvider for FakeVideoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Seedream
    }

    fn resolution(&self, _aspect_ratio: AspectRatio) -> &'static str {
        "1248x704"
    }

    async fn generate_video(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        _options: &GenerationOptions,
    ) -> ProviderResult<String> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(VideoCall {
                image: image.to_string(),
                prompt: prompt.to_string(),
                aspect_ratio,
            });
            calls.len() - 1
        };
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_from.load(Ordering::SeqCst) {
            return Err(ProviderError::GenerationFailed {
                operation: format!("task-{n}"),
                message: "content rejected".into(),
            });
        }
        Ok(format!(
            "https://videos.example.com/{n}-{}.mp4",
            aspect_ratio.as_filename_part()
        ))
    }
}

#[derive(Default)]
pub struct FakeVoice {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub texts: Mutex<Vec<String>>,
}

#[async_trait]
impl VoiceGenerator for FakeVoice {
    async fn synthesize(&self, text: &str, _voice_id: Option<&str>) -> ProviderResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::validation("elevenlabs", "quota exceeded"));
        }
        Ok(b"ID3voice".to_vec())
    }
}

#[derive(Default)]
pub struct FakeMusic {
    pub track: Option<PathBuf>,
    pub requests: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl MusicSelector for FakeMusic {
    fn select(&self, style: Option<&str>, category: Option<&str>) -> Option<MusicSelection> {
        self.requests
            .lock()
            .unwrap()
            .push((style.map(str::to_string), category.map(str::to_string)));
        self.track.clone().map(|path| MusicSelection {
            path,
            style: "energetic",
            bpm: 120,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaOp {
    Concat(usize),
    Subtitles(Vec<SubtitleCue>, SubtitleStyle),
    Mix { music: bool, volume: f32 },
    ResizePad(u32, u32),
    Frame,
}

#[derive(Default)]
pub struct FakeToolkit {
    pub ops: Mutex<Vec<MediaOp>>,
}

impl FakeToolkit {
    async fn emit(&self, op: MediaOp, output: &Path) -> MediaResult<PathBuf> {
        self.ops.lock().unwrap().push(op);
        tokio::fs::write(output, b"media").await?;
        Ok(output.to_path_buf())
    }

    pub fn ops(&self) -> Vec<MediaOp> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        for clip in clips {
            assert!(clip.exists(), "clip {} was not fetched", clip.display());
        }
        self.emit(MediaOp::Concat(clips.len()), output).await
    }

    async fn burn_subtitles(
        &self,
        _video: &Path,
        cues: &[SubtitleCue],
        style: SubtitleStyle,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        self.emit(MediaOp::Subtitles(cues.to_vec(), style), output).await
    }

    async fn mix_audio(
        &self,
        _video: &Path,
        voice: &Path,
        music: Option<&Path>,
        music_volume: f32,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        assert!(voice.exists(), "voiceover missing");
        self.emit(
            MediaOp::Mix {
                music: music.is_some(),
                volume: music_volume,
            },
            output,
        )
        .await
    }

    async fn resize_pad(&self, _video: &Path, width: u32, height: u32, output: &Path) -> MediaResult<PathBuf> {
        self.emit(MediaOp::ResizePad(width, height), output).await
    }

    async fn extract_frame(&self, _video: &Path, output: &Path) -> MediaResult<PathBuf> {
        self.emit(MediaOp::Frame, output).await
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub puts: Mutex<Vec<String>>,
    pub fetches: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for FakeStore {
    async fn put_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
        assert!(path.exists(), "upload source {} missing", path.display());
        self.puts.lock().unwrap().push(key.to_string());
        Ok(format!("{ASSET_BASE}/{key}"))
    }

    async fn put_bytes(&self, _data: Vec<u8>, key: &str, _content_type: &str) -> StorageResult<String> {
        self.puts.lock().unwrap().push(key.to_string());
        Ok(format!("{ASSET_BASE}/{key}"))
    }

    async fn fetch(&self, reference: &str, dest: &Path) -> StorageResult<()> {
        self.fetches.lock().unwrap().push(reference.to_string());
        tokio::fs::write(dest, b"bytes").await?;
        Ok(())
    }
}

/// Repository whose commits fail with a connection error while `trigger`
/// matches the job being committed, up to `failures` times.
pub struct FlakyRepository {
    inner: Arc<InMemoryJobRepository>,
    failures: AtomicUsize,
    trigger: Box<dyn Fn(&Job) -> bool + Send + Sync>,
    pub failed_commits: AtomicUsize,
}

impl FlakyRepository {
    pub fn new(
        inner: Arc<InMemoryJobRepository>,
        failures: usize,
        trigger: impl Fn(&Job) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            trigger: Box::new(trigger),
            failed_commits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobRepository for FlakyRepository {
    async fn create(&self, job: &Job) -> QueueResult<()> {
        self.inner.create(job).await
    }

    async fn load(&self, job_id: &promoreel_models::JobId) -> QueueResult<Job> {
        self.inner.load(job_id).await
    }

    async fn commit(&self, job: &mut Job) -> QueueResult<()> {
        if (self.trigger)(job)
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.failed_commits.fetch_add(1, Ordering::SeqCst);
            return Err(QueueError::connection_failed("connection reset by peer"));
        }
        self.inner.commit(job).await
    }
}

/// Every fake wired into an orchestrator over an in-memory repository.
pub struct Harness {
    pub repo: Arc<InMemoryJobRepository>,
    pub enhancer: Arc<FakeEnhancer>,
    pub storyboards: Arc<FakeStoryboards>,
    pub provider: Arc<FakeVideoProvider>,
    pub voice: Arc<FakeVoice>,
    pub music: Arc<FakeMusic>,
    pub toolkit: Arc<FakeToolkit>,
    pub store: Arc<FakeStore>,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(durations: &[f64]) -> Self {
        Self::with_storyboards(FakeStoryboards::new(durations))
    }

    pub fn with_storyboards(storyboards: FakeStoryboards) -> Self {
        Self {
            repo: Arc::new(InMemoryJobRepository::new()),
            enhancer: Arc::new(FakeEnhancer::default()),
            storyboards: Arc::new(storyboards),
            provider: Arc::new(FakeVideoProvider::default()),
            voice: Arc::new(FakeVoice::default()),
            music: Arc::new(FakeMusic::default()),
            toolkit: Arc::new(FakeToolkit::default()),
            store: Arc::new(FakeStore::default()),
            work_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn orchestrator(&self, max_clip_parallel: usize) -> Orchestrator {
        self.orchestrator_with_repo(max_clip_parallel, self.repo.clone())
    }

    /// Orchestrator committing through `repo` instead of `self.repo`.
    pub fn orchestrator_with_repo(&self, max_clip_parallel: usize, repo: Arc<dyn JobRepository>) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        registry.register(self.provider.clone());

        let config = WorkerConfig {
            max_clip_parallel,
            work_dir: self.work_dir.path().to_path_buf(),
            commit_retry_delay: Duration::from_millis(1),
            ..WorkerConfig::default()
        };

        let services = PipelineServices {
            enhancer: self.enhancer.clone(),
            storyboards: self.storyboards.clone(),
            providers: Arc::new(registry),
            voice: self.voice.clone(),
            music: self.music.clone(),
            toolkit: self.toolkit.clone(),
            store: self.store.clone(),
        };

        Orchestrator::new(repo, services, &config)
    }

    pub async fn create_job(&self, images: &[&str], ratios: &[AspectRatio], options: JobOptions) -> Job {
        let job = Job::new(
            "user-1",
            images.iter().map(|s| s.to_string()).collect(),
            ratios.to_vec(),
            options,
        );
        self.repo.create(&job).await.unwrap();
        job
    }
}
