//! Product image enhancement.

use async_trait::async_trait;
use promoreel_models::EnhancementResult;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, ensure_success, require_key};

/// Style variations requested when variation generation is on.
pub const VARIATION_COUNT: usize = 6;

const VARIATION_STYLES: &[&str] = &["realistic", "studio", "natural", "professional", "dramatic", "bright"];
const VARIATION_ANGLES: &[&str] = &["front", "side", "back", "top", "diagonal", "closeup"];

/// Label anchors, cycled for more than four points.
const LABEL_POSITIONS: &[(&str, &str)] = &[("10%", "10%"), ("80%", "15%"), ("10%", "75%"), ("80%", "80%")];

/// What to do for each image.
#[derive(Debug, Clone, Default)]
pub struct EnhanceRequest {
    pub selling_points: Vec<String>,
    pub generate_variations: bool,
}

/// Image enhancement collaborator.
///
/// `enhance` never fails; remote errors degrade to the original image.
#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, image_url: &str, request: &EnhanceRequest) -> EnhancementResult;

    /// Overlay selling points on an image and return the annotated reference.
    async fn annotate(&self, image_url: &str, selling_points: &[String]) -> ProviderResult<String>;
}

#[derive(Debug, Serialize)]
struct Annotation<'a> {
    text: &'a str,
    position: Value,
    style: Value,
}

fn annotations(selling_points: &[String]) -> Vec<Annotation<'_>> {
    selling_points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let (x, y) = LABEL_POSITIONS[i % LABEL_POSITIONS.len()];
            Annotation {
                text: point,
                position: json!({"x": x, "y": y}),
                style: json!({
                    "font_size": 32,
                    "font_weight": "bold",
                    "color": "#FFFFFF",
                    "background": "rgba(0,0,0,0.7)",
                    "padding": 10,
                    "border_radius": 8,
                    "animation": "modern",
                }),
            }
        })
        .collect()
}

fn string_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Nano Banana image API client.
#[derive(Debug, Clone)]
pub struct NanoBananaClient {
    http: Client,
    config: ServiceConfig,
}

impl NanoBananaClient {
    pub fn new(config: ServiceConfig) -> ProviderResult<Self> {
        if config.api_key.is_none() {
            warn!("NANOBANANA_API_KEY is not set, enhancement will pass images through");
        }
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    async fn post(&self, path: &str, payload: &Value) -> ProviderResult<Value> {
        let key = require_key("nanobanana", self.config.api_key.as_deref())?;
        let response = self
            .http
            .post(format!("{}/{}", self.config.base_url, path))
            .bearer_auth(key)
            .json(payload)
            .send()
            .await?;
        Ok(ensure_success("nanobanana", response).await?.json().await?)
    }

    /// Sharpen, denoise and color-correct one image.
    pub async fn clarity(&self, image_url: &str) -> ProviderResult<String> {
        let body = self
            .post(
                "enhance",
                &json!({
                    "image_url": image_url,
                    "enhancement_type": self.config.model,
                    "options": {
                        "quality_boost": true,
                        "sharpness": true,
                        "noise_reduction": true,
                        "color_correction": true,
                    }
                }),
            )
            .await?;
        string_field(&body, &["enhanced_image_url", "output_url"])
            .ok_or_else(|| ProviderError::inconsistent("enhance response has no image url"))
    }

    /// Style/angle variations of an image, the input first.
    pub async fn variations(&self, image_url: &str) -> ProviderResult<Vec<String>> {
        let body = self
            .post(
                "multi-angle",
                &json!({
                    "image_url": image_url,
                    "num_variations": VARIATION_COUNT,
                    "styles": VARIATION_STYLES,
                    "angles": VARIATION_ANGLES,
                    "options": {
                        "maintain_quality": true,
                        "consistent_lighting": false,
                        "vary_style": true,
                        "generate_styles": true,
                    }
                }),
            )
            .await?;

        let urls = ["variation_urls", "angle_urls", "variations"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_array))
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut all = vec![image_url.to_string()];
        all.extend(urls.into_iter().take(VARIATION_COUNT - 1));
        Ok(all)
    }
}

#[async_trait]
impl Enhancer for NanoBananaClient {
    async fn enhance(&self, image_url: &str, request: &EnhanceRequest) -> EnhancementResult {
        if !self.is_configured() {
            return EnhancementResult::fallback(image_url, None);
        }

        let enhanced = match self.clarity(image_url).await {
            Ok(url) => url,
            Err(e) => {
                warn!(image = image_url, error = %e, "Clarity enhancement failed, using original");
                return EnhancementResult::fallback(image_url, Some(e.to_string()));
            }
        };

        let variations = if request.generate_variations {
            self.variations(&enhanced).await.unwrap_or_else(|e| {
                warn!(error = %e, "Variation generation failed");
                vec![enhanced.clone()]
            })
        } else {
            vec![enhanced.clone()]
        };

        let annotated = if request.selling_points.is_empty() {
            None
        } else {
            match self.annotate(&enhanced, &request.selling_points).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(error = %e, "Selling point overlay failed");
                    None
                }
            }
        };

        info!(image = image_url, variations = variations.len(), annotated = annotated.is_some(), "Enhanced image");
        EnhancementResult {
            original: image_url.to_string(),
            enhanced,
            variations,
            annotated,
            error: None,
        }
    }

    async fn annotate(&self, image_url: &str, selling_points: &[String]) -> ProviderResult<String> {
        if !self.is_configured() {
            return Ok(image_url.to_string());
        }
        let body = self
            .post(
                "annotate",
                &json!({
                    "image_url": image_url,
                    "annotations": annotations(selling_points),
                    "options": {
                        "smart_placement": true,
                        "avoid_important_areas": true,
                        "readability": true,
                    }
                }),
            )
            .await?;
        string_field(&body, &["annotated_image_url", "output_url"])
            .ok_or_else(|| ProviderError::inconsistent("annotate response has no image url"))
    }
}
