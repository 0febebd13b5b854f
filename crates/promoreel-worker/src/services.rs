//! Production wiring of the pipeline collaborators.

use std::sync::Arc;

use tracing::info;

use promoreel_media::{FfmpegRunner, FfmpegToolkit};
use promoreel_providers::{
    ElevenLabsClient, ImagePreparer, MusicLibrary, NanoBananaClient, OpenAiStoryboardClient,
    ProviderRegistry,
};
use promoreel_storage::{store_from_env, LocalAssetStore};

use crate::config::AppConfig;
use crate::error::WorkerResult;
use crate::orchestrator::PipelineServices;

impl PipelineServices {
    /// Build the real HTTP clients, FFmpeg toolkit and asset store.
    pub async fn from_config(config: &AppConfig) -> WorkerResult<Self> {
        let providers = &config.providers;

        let images = Arc::new(ImagePreparer::new(providers.image.clone())?);
        let registry = ProviderRegistry::from_config(providers)?;
        let enhancer = NanoBananaClient::new(providers.nanobanana.clone())?;
        let storyboards = OpenAiStoryboardClient::new(providers.openai.clone(), images)?;
        let voice = ElevenLabsClient::new(providers.elevenlabs.clone(), providers.voice.clone())?;
        let music = MusicLibrary::new(providers.music_dir.clone());

        let toolkit = FfmpegToolkit::new(
            FfmpegRunner::new().with_timeout(config.worker.ffmpeg_timeout_secs),
        );

        let local = LocalAssetStore::new(
            config.local_storage.root.clone(),
            config.local_storage.public_base_url.clone(),
        )?;
        let store = store_from_env(local).await?;

        info!(
            music_dir = %providers.music_dir.display(),
            "Pipeline services ready"
        );

        Ok(Self {
            enhancer: Arc::new(enhancer),
            storyboards: Arc::new(storyboards),
            providers: Arc::new(registry),
            voice: Arc::new(voice),
            music: Arc::new(music),
            toolkit: Arc::new(toolkit),
            store,
        })
    }
}
