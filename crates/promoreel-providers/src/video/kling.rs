//! Kling image-to-video.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use promoreel_models::{AspectRatio, ProviderKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{interpret_submission, observe, resolve, GenerationOptions, Submission, VideoProvider};
use crate::config::{KlingKeys, PollConfig, ServiceConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, ensure_success};
use crate::image_prep::{EmbedPolicy, ImagePreparer};
use crate::polling::{poll_until_complete, HttpStatusQuery};

const RESOLUTIONS: &[(AspectRatio, &str)] = &[
    (AspectRatio::LANDSCAPE, "1280x720"),
    (AspectRatio::PORTRAIT, "720x1280"),
    (AspectRatio::SQUARE, "960x960"),
    (AspectRatio::CLASSIC, "960x720"),
    (AspectRatio::CLASSIC_PORTRAIT, "720x960"),
    (AspectRatio::ULTRAWIDE, "1680x720"),
];

/// Signed tokens live for 30 minutes.
const TOKEN_TTL_SECS: i64 = 1800;

#[derive(Debug, Serialize, Deserialize)]
struct KlingClaims {
    iss: String,
    exp: i64,
    nbf: i64,
}

/// Sign a short-lived HS256 token from an access/secret key pair.
fn sign_token(access_key: &str, secret_key: &str) -> ProviderResult<String> {
    let now = Utc::now().timestamp();
    let claims = KlingClaims {
        iss: access_key.to_string(),
        exp: now + TOKEN_TTL_SECS,
        nbf: now - 5,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )
    .map_err(|e| ProviderError::auth("kling", format!("could not sign token: {}", e)))
}

/// Kling takes raw base64 rather than a data URI.
fn strip_data_uri(image: &str) -> &str {
    match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    }
}

pub struct KlingProvider {
    http: Client,
    config: ServiceConfig,
    keys: KlingKeys,
    images: Arc<ImagePreparer>,
    poll: PollConfig,
}

impl KlingProvider {
    pub fn new(
        config: ServiceConfig,
        keys: KlingKeys,
        images: Arc<ImagePreparer>,
        poll: PollConfig,
    ) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
            keys,
            images,
            poll,
        })
    }

    /// Bearer credential: a signed JWT when both keys are set, otherwise
    /// the plain API key.
    fn credential(&self) -> ProviderResult<String> {
        match (&self.keys.access_key, &self.keys.secret_key) {
            (Some(access), Some(secret)) => sign_token(access, secret),
            _ => self
                .config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ProviderError::auth("kling", "API key is not configured")),
        }
    }

    async fn generate(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        options: &GenerationOptions,
    ) -> ProviderResult<String> {
        let token = self.credential()?;
        let image = self.images.prepare(image, EmbedPolicy::WhenPrivate).await?;

        let payload = json!({
            "model_name": options.model.as_deref().unwrap_or(&self.config.model),
            "image": strip_data_uri(image.as_str()),
            "prompt": prompt,
            "mode": "std",
            "duration": options.clip_length().to_string(),
            "aspect_ratio": aspect_ratio.token(),
            "resolution": self.resolution(aspect_ratio),
        });

        info!(embedded = image.is_embedded(), "Submitting Kling generation");
        let response = self
            .http
            .post(format!("{}/v1/videos/image2video", self.config.base_url))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success("kling", response).await?.json().await?;

        if let Some(code) = body.get("code").and_then(Value::as_i64).filter(|c| *c != 0) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ProviderError::validation("kling", format!("code {}: {}", code, message)));
        }

        match interpret_submission("kling", &body)? {
            Submission::Ready(url) => Ok(url),
            Submission::Pending { operation } => {
                let source = HttpStatusQuery::new(&self.config.base_url, self.poll.request_timeout)?
                    .with_bearer(&token);
                let endpoints = vec![format!("v1/videos/image2video/{}", operation)];
                poll_until_complete(&source, "kling", &operation, &endpoints, &self.poll).await
            }
        }
    }
}

#[async_trait]
impl VideoProvider for KlingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kling
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
