//! Google Veo3 image-to-video.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use promoreel_models::{AspectRatio, ProviderKind};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use super::{interpret_submission, observe, resolve, GenerationOptions, Submission, VideoProvider};
use crate::config::{PollConfig, ServiceConfig};
use crate::error::ProviderResult;
use crate::http::{build_client, ensure_success, require_key};
use crate::image_prep::{EmbedPolicy, ImagePreparer};
use crate::polling::{poll_until_complete, HttpStatusQuery};

const RESOLUTIONS: &[(AspectRatio, &str)] = &[
    (AspectRatio::LANDSCAPE, "1920x1080"),
    (AspectRatio::PORTRAIT, "1080x1920"),
    (AspectRatio::SQUARE, "1080x1080"),
    (AspectRatio::CLASSIC, "1440x1080"),
    (AspectRatio::CLASSIC_PORTRAIT, "1080x1440"),
    (AspectRatio::ULTRAWIDE, "2560x1080"),
];

pub struct Veo3Provider {
    http: Client,
    config: ServiceConfig,
    images: Arc<ImagePreparer>,
    poll: PollConfig,
}

impl Veo3Provider {
    pub fn new(config: ServiceConfig, images: Arc<ImagePreparer>, poll: PollConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
            images,
            poll,
        })
    }

    async fn generate(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        options: &GenerationOptions,
    ) -> ProviderResult<String> {
        let key = require_key("veo3", self.config.api_key.as_deref())?;
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let image = self.images.prepare(image, EmbedPolicy::WhenPrivate).await?;

        let payload = json!({
            "image": image.as_str(),
            "prompt": prompt,
            "aspect_ratio": aspect_ratio.token(),
            "resolution": self.resolution(aspect_ratio),
            "duration_seconds": options.clip_length(),
        });

        info!(model, embedded = image.is_embedded(), "Submitting Veo3 generation");
        let response = self
            .http
            .post(format!("{}/models/{}:predict", self.config.base_url, model))
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success("veo3", response).await?.json().await?;

        match interpret_submission("veo3", &body)? {
            Submission::Ready(url) => Ok(url),
            Submission::Pending { operation } => {
                let source = HttpStatusQuery::new(&self.config.base_url, self.poll.request_timeout)?
                    .with_bearer(key);
                let endpoints = vec![format!("models/{}:getOperation?name={}", model, operation)];
                poll_until_complete(&source, "veo3", &operation, &endpoints, &self.poll).await
            }
        }
    }
}

#[async_trait]
impl VideoProvider for Veo3Provider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Veo3
    }

    fn resolution(&self, aspect_ratio: AspectRatio) -> &'static str {
        resolve(RESOLUTIONS, aspect_ratio)
    }

    async fn generate_video(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        options: &GenerationOptions,
    ) -> ProviderResult<String> {
        let started = Instant::now();
        let result = self.generate(image, prompt, aspect_ratio, options).await;
        observe(self.kind(), started, &result);
        result
    }
}
