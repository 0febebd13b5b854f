//! Clients for the remote generative services behind PromoReel.
//!
//! This crate provides:
//! - Image preparation for provider payload limits
//! - A generic polling engine for asynchronous operations
//! - The `VideoProvider` abstraction with Runway, Veo3, Kling and Seedream backends
//! - Image enhancement, storyboard, voiceover and music collaborators

pub mod config;
pub mod enhance;
pub mod error;
pub mod http;
pub mod image_prep;
pub mod metrics;
pub mod music;
pub mod polling;
pub mod registry;
pub mod storyboard;
pub mod video;
pub mod voice;

#[cfg(test)]
mod test_support;

pub use config::{ImageConfig, KlingKeys, PollConfig, ProviderConfig, ServiceConfig, VoiceConfig};
pub use enhance::{EnhanceRequest, Enhancer, NanoBananaClient};
pub use error::{ProviderError, ProviderResult};
pub use image_prep::{EmbedPolicy, ImagePreparer, PreparedImage};
pub use music::{MusicLibrary, MusicSelection, MusicSelector};
pub use polling::{poll_until_complete, HttpStatusQuery, QueryOutcome, StatusQuery, TaskState};
pub use registry::ProviderRegistry;
pub use storyboard::{OpenAiStoryboardClient, StoryboardGenerator, StoryboardRequest};
pub use video::{GenerationOptions, VideoProvider};
pub use voice::{ElevenLabsClient, VoiceGenerator};
