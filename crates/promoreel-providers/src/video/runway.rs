//! Runway image-to-video.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use promoreel_models::{AspectRatio, ProviderKind};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use super::{interpret_submission, observe, resolve, GenerationOptions, Submission, VideoProvider};
use crate::config::{PollConfig, ServiceConfig, RUNWAY_API_VERSION};
use crate::error::ProviderResult;
use crate::http::{build_client, ensure_success, require_key};
use crate::image_prep::{EmbedPolicy, ImagePreparer};
use crate::polling::{poll_until_complete, HttpStatusQuery};

const RESOLUTIONS: &[(AspectRatio, &str)] = &[
    (AspectRatio::LANDSCAPE, "1280:720"),
    (AspectRatio::PORTRAIT, "720:1280"),
    (AspectRatio::SQUARE, "960:960"),
    (AspectRatio::CLASSIC, "1104:832"),
    (AspectRatio::CLASSIC_PORTRAIT, "832:1104"),
    (AspectRatio::ULTRAWIDE, "1584:672"),
];

/// Runway Gen-4 client. Always submits an embedded image.
pub struct RunwayProvider {
    http: Client,
    config: ServiceConfig,
    images: Arc<ImagePreparer>,
    poll: PollConfig,
}

impl RunwayProvider {
    pub fn new(config: ServiceConfig, images: Arc<ImagePreparer>, poll: PollConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
            images,
            poll,
        })
    }

    fn status_endpoints(operation: &str) -> Vec<String> {
        vec![
            format!("tasks/{}", operation),
            format!("generations/{}", operation),
            format!("image_to_video/{}", operation),
        ]
    }

    async fn generate(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        options: &GenerationOptions,
    ) -> ProviderResult<String> {
        let key = require_key("runway", self.config.api_key.as_deref())?;
        let prompt_image = self.images.prepare(image, EmbedPolicy::Always).await?;
        let ratio = self.resolution(aspect_ratio);

        let payload: Value = json!({
            "model": options.model.as_deref().unwrap_or(&self.config.model),
            "promptImage": prompt_image.as_str(),
            "promptText": prompt,
            "motionBucket": 127,
            "ratio": ratio,
            "duration": options.clip_length(),
            "watermark": false,
        });

        info!(ratio, "Submitting Runway generation");
        let response = self
            .http
            .post(format!("{}/image_to_video", self.config.base_url))
            .bearer_auth(key)
            .header("X-Runway-Version", RUNWAY_API_VERSION)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success("runway", response).await?.json().await?;

        match interpret_submission("runway", &body)? {
            Submission::Ready(url) => Ok(url),
            Submission::Pending { operation } => {
                let source = HttpStatusQuery::new(&self.config.base_url, self.poll.request_timeout)?
                    .with_bearer(key)
                    .with_header("X-Runway-Version", RUNWAY_API_VERSION);
                poll_until_complete(
                    &source,
                    "runway",
                    &operation,
                    &Self::status_endpoints(&operation),
                    &self.poll,
                )
                .await
            }
        }
    }
}

#[async_trait]
impl VideoProvider for RunwayProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Runway
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageConfig, ProviderConfig};
    use crate::error::ProviderError;
    use crate::test_support::{fast_poll, mount_product_image};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: Option<&str>) -> RunwayProvider {
        let mut config = ProviderConfig::default().runway.with_base_url(server.uri());
        config.api_key = key.map(str::to_string);
        RunwayProvider::new(
            config,
            Arc::new(ImagePreparer::new(ImageConfig::default()).unwrap()),
            fast_poll(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolution_table() {
        let server = MockServer::start().await;
        let provider = provider(&server, Some("rw-key"));
        let expected = [
            (AspectRatio::LANDSCAPE, "1280:720"),
            (AspectRatio::PORTRAIT, "720:1280"),
            (AspectRatio::SQUARE, "960:960"),
            (AspectRatio::CLASSIC, "1104:832"),
            (AspectRatio::CLASSIC_PORTRAIT, "832:1104"),
            (AspectRatio::ULTRAWIDE, "1584:672"),
            (AspectRatio::new(5, 4), "1280:720"),
        ];
        for (ratio, resolution) in expected {
            assert_eq!(provider.resolution(ratio), resolution, "{ratio}");
        }
    }

    #[tokio::test]
    async fn test_submit_then_poll_fallback_endpoint() {
        let server = MockServer::start().await;
        let image = mount_product_image(&server).await;

        Mock::given(method("POST"))
            .and(path("/image_to_video"))
            .and(header("X-Runway-Version", RUNWAY_API_VERSION))
            .and(header("Authorization", "Bearer rw-key"))
            .and(body_partial_json(json!({"ratio": "720:1280", "model": "gen4_turbo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "gen-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/generations/gen-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "SUCCEEDED",
                "output": ["https://cdn.runway/clip.mp4"]
            })))
            .mount(&server)
            .await;

        let url = provider(&server, Some("rw-key"))
            .generate_video(&image, "Smooth product showcase", AspectRatio::PORTRAIT, &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.runway/clip.mp4");

        let requests = server.received_requests().await.unwrap();
        let submit = requests.iter().find(|r| r.method.to_string() == "POST").unwrap();
        let body: Value = serde_json::from_slice(&submit.body).unwrap();
        assert!(body["promptImage"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let server = MockServer::start().await;
        let result = provider(&server, None)
            .generate_video("https://x/a.png", "p", AspectRatio::LANDSCAPE, &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::Auth { .. })));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_credits_is_validation_error() {
        let server = MockServer::start().await;
        let image = mount_product_image(&server).await;
        Mock::given(method("POST"))
            .and(path("/image_to_video"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "You do not have enough credits to run this task."})),
            )
            .mount(&server)
            .await;

        let result = provider(&server, Some("rw-key"))
            .generate_video(&image, "p", AspectRatio::LANDSCAPE, &GenerationOptions::default())
            .await;
        match result {
            Err(ProviderError::Validation { message, .. }) => {
                assert!(message.starts_with("insufficient credits"))
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        let image = mount_product_image(&server).await;
        Mock::given(method("POST"))
            .and(path("/image_to_video"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = provider(&server, Some("bad"))
            .generate_video(&image, "p", AspectRatio::LANDSCAPE, &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::Auth { .. })));
    }
}
