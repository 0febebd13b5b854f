//! Seedream (Seedance) image-to-video via the content generation task API.

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

const TASKS_PATH: &str = "api/v3/contents/generations/tasks";

const RESOLUTIONS: &[(AspectRatio, &str)] = &[
    (AspectRatio::LANDSCAPE, "1248x704"),
    (AspectRatio::PORTRAIT, "704x1248"),
    (AspectRatio::SQUARE, "960x960"),
    (AspectRatio::CLASSIC, "1120x832"),
    (AspectRatio::CLASSIC_PORTRAIT, "832x1120"),
    (AspectRatio::ULTRAWIDE, "1504x640"),
];

pub struct SeedreamProvider {
    http: Client,
    config: ServiceConfig,
    images: Arc<ImagePreparer>,
    poll: PollConfig,
}

impl SeedreamProvider {
    pub fn new(config: ServiceConfig, images: Arc<ImagePreparer>, poll: PollConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
            images,
            poll,
        })
    }

    /// Text part with the inline generation parameters the task API reads.
    fn prompt_text(prompt: &str, aspect_ratio: AspectRatio, options: &GenerationOptions) -> String {
        let ratio = if aspect_ratio.is_known() {
            aspect_ratio
        } else {
            AspectRatio::LANDSCAPE
        };
        format!(
            "{} --ratio {} --dur {} --watermark false",
            prompt.trim(),
            ratio,
            options.clip_length()
        )
    }

    async fn generate(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        options: &GenerationOptions,
    ) -> ProviderResult<String> {
        let key = require_key("seedream", self.config.api_key.as_deref())?;
        let image = self.images.prepare(image, EmbedPolicy::WhenPrivate).await?;

        let payload = json!({
            "model": options.model.as_deref().unwrap_or(&self.config.model),
            "content": [
                {"type": "text", "text": Self::prompt_text(prompt, aspect_ratio, options)},
                {"type": "image_url", "image_url": {"url": image.as_str()}},
            ],
            "resolution": self.resolution(aspect_ratio),
        });

        info!(embedded = image.is_embedded(), "Submitting Seedream generation");
        let response = self
            .http
            .post(format!("{}/{}", self.config.base_url, TASKS_PATH))
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success("seedream", response).await?.json().await?;

        match interpret_submission("seedream", &body)? {
            Submission::Ready(url) => Ok(url),
            Submission::Pending { operation } => {
                let source = HttpStatusQuery::new(&self.config.base_url, self.poll.request_timeout)?
                    .with_bearer(key);
                let endpoints = vec![format!("{}/{}", TASKS_PATH, operation)];
                poll_until_complete(&source, "seedream", &operation, &endpoints, &self.poll).await
            }
        }
    }
}

#[async_trait]
impl VideoProvider for SeedreamProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Seedream
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
