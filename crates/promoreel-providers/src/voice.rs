//! Text-to-speech narration.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::config::{ServiceConfig, VoiceConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, ensure_success, require_key};

#[async_trait]
pub trait VoiceGenerator: Send + Sync {
    /// Synthesize `text` and return MP3 bytes. `voice_id` overrides the
    /// configured voice.
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> ProviderResult<Vec<u8>>;
}

/// ElevenLabs text-to-speech client.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    http: Client,
    config: ServiceConfig,
    voice: VoiceConfig,
}

impl ElevenLabsClient {
    pub fn new(config: ServiceConfig, voice: VoiceConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
            voice,
        })
    }
}

#[async_trait]
impl VoiceGenerator for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> ProviderResult<Vec<u8>> {
        let key = require_key("elevenlabs", self.config.api_key.as_deref())?;
        if text.trim().is_empty() {
            return Err(ProviderError::validation("elevenlabs", "narration text is empty"));
        }
        let voice_id = voice_id.unwrap_or(&self.voice.voice_id);

        let response = self
            .http
            .post(format!("{}/text-to-speech/{}", self.config.base_url, voice_id))
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", key)
            .json(&json!({
                "text": text,
                "model_id": self.config.model,
                "voice_settings": {
                    "stability": self.voice.stability,
                    "similarity_boost": self.voice.similarity_boost,
                }
            }))
            .send()
            .await?;

        let audio = ensure_success("elevenlabs", response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::inconsistent("text-to-speech returned no audio"));
        }
        info!(voice_id, bytes = audio.len(), chars = text.len(), "Synthesized voiceover");
        Ok(audio.to_vec())
    }
}
