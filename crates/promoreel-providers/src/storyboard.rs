//! Storyboard generation via a chat-completions model.

use std::sync::Arc;

use async_trait::async_trait;
use promoreel_models::Storyboard;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, ensure_success, require_key};
use crate::image_prep::{EmbedPolicy, ImagePreparer};

/// Images attached to the request as vision parts.
pub const MAX_IMAGE_PARTS: usize = 4;

const SYSTEM_PROMPT: &str = "You are an expert video scriptwriter specializing in product marketing \
videos for social media platforms. You create engaging, conversion-focused content.";

/// Inputs for one storyboard.
#[derive(Debug, Clone, Default)]
pub struct StoryboardRequest {
    pub image_urls: Vec<String>,
    pub product_category: Option<String>,
    pub selling_points: Vec<String>,
}

#[async_trait]
pub trait StoryboardGenerator: Send + Sync {
    /// Produce a validated, normalized storyboard.
    async fn generate(&self, request: &StoryboardRequest) -> ProviderResult<Storyboard>;
}

fn product_info(request: &StoryboardRequest) -> Option<Value> {
    if request.product_category.is_none() && request.selling_points.is_empty() {
        return None;
    }
    Some(json!({
        "category": request.product_category,
        "selling_points": request.selling_points,
    }))
}

/// Text prompt listing the images and the required JSON shape.
pub fn build_prompt(request: &StoryboardRequest) -> String {
    let count = request.image_urls.len();
    let image_refs = request
        .image_urls
        .iter()
        .enumerate()
        .map(|(i, url)| format!("Image {}: {}", i + 1, url))
        .collect::<Vec<_>>()
        .join("\n");
    let info = product_info(request)
        .map(|v| format!("Product Info: {}\n", v))
        .unwrap_or_default();

    format!(
        r#"You are a professional video scriptwriter for product marketing videos.
Analyze the product images and create a compelling video storyboard optimized for social media (TikTok, Instagram Reels, YouTube Shorts).

Product Images ({count} total):
{image_refs}

{info}
Create a storyboard with 3-6 shots. For each shot, you MUST provide:
1. shot_number: Sequential number starting from 1
2. image_reference: Index number (0-based) of which image from the input list to use, or "b-roll" if suggesting B-roll footage
3. text: Subtitle text (large, centered, trending style - max 5 words per subtitle)
4. duration: Suggested duration in seconds (3-8 seconds per shot is typical)
5. hook: Boolean indicating if this is the hook (first 3 seconds - attention-grabbing)
6. selling_points: Array of key product features/benefits to highlight (extracted from shot)
7. cta: Call-to-action text for the end (only the last shot should have this, others should be empty string)
8. action_instructions: One short sentence describing camera or product motion for this shot

IMPORTANT:
- The first shot MUST have hook: true
- Only the LAST shot should have a non-empty cta field
- Each shot must reference an image by index (0 to {last}) or use "b-roll"
- Distribute images across shots to showcase different angles/features

Return ONLY valid JSON in this exact format:
{{
    "shots": [
        {{"shot_number": 1, "image_reference": 0, "text": "Introducing the Future", "duration": 3, "hook": true, "selling_points": ["Premium quality"], "cta": "", "action_instructions": "Slow push in on the product"}},
        {{"shot_number": 2, "image_reference": 1, "text": "Shop Now", "duration": 3, "hook": false, "selling_points": ["Limited time offer"], "cta": "Shop Now - Link in Bio", "action_instructions": "Gentle orbit around the product"}}
    ],
    "hook_text": "Attention-grabbing opening text",
    "main_selling_points": ["Key benefit 1", "Key benefit 2", "Key benefit 3"],
    "final_cta": "Shop Now - Link in Bio",
    "total_duration": 6,
    "music_style": "energetic | calm | modern"
}}"#,
        last = count.saturating_sub(1),
    )
}

/// Parse the model's JSON answer into a normalized storyboard.
pub fn parse_storyboard(content: &str) -> ProviderResult<Storyboard> {
    let storyboard: Storyboard = serde_json::from_str(content)
        .map_err(|e| ProviderError::inconsistent(format!("invalid storyboard JSON: {}", e)))?;

    if !storyboard.has_expected_shot_count() {
        warn!(
            shots = storyboard.shots.len(),
            "Storyboard shot count outside the expected 3-6"
        );
    }

    storyboard
        .normalize()
        .map_err(|e| ProviderError::inconsistent(format!("invalid storyboard: {}", e)))
}

/// OpenAI chat-completions client for storyboards.
pub struct OpenAiStoryboardClient {
    http: Client,
    config: ServiceConfig,
    images: Arc<ImagePreparer>,
}

impl OpenAiStoryboardClient {
    pub fn new(config: ServiceConfig, images: Arc<ImagePreparer>) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
            images,
        })
    }

    async fn user_content(&self, request: &StoryboardRequest) -> ProviderResult<Vec<Value>> {
        let mut content = vec![json!({"type": "text", "text": build_prompt(request)})];
        for url in request.image_urls.iter().take(MAX_IMAGE_PARTS) {
            let image = self.images.prepare(url, EmbedPolicy::WhenPrivate).await?;
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": image.as_str()},
            }));
        }
        Ok(content)
    }
}

#[async_trait]
impl StoryboardGenerator for OpenAiStoryboardClient {
    async fn generate(&self, request: &StoryboardRequest) -> ProviderResult<Storyboard> {
        let key = require_key("openai", self.config.api_key.as_deref())?;
        info!(images = request.image_urls.len(), "Generating storyboard");

        let payload = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": self.user_content(request).await?},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.7,
            "max_tokens": 2000,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success("openai", response).await?.json().await?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::inconsistent("chat completion has no message content"))?;

        let storyboard = parse_storyboard(content)?;
        info!(
            shots = storyboard.shots.len(),
            duration = storyboard.total_duration,
            "Storyboard generated"
        );
        Ok(storyboard)
    }
}
