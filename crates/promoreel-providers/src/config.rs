//! Provider configuration.

use std::path::PathBuf;
use std::time::Duration;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Polling engine settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between status rounds
    pub interval: Duration,
    /// Status rounds before giving up
    pub max_attempts: u32,
    /// Consecutive all-not-found rounds before giving up on the endpoints
    pub not_found_rounds: u32,
    /// Timeout for a single status request
    pub request_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
            not_found_rounds: 3,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_parse("POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            max_attempts: env_parse("POLL_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            not_found_rounds: env_parse("POLL_NOT_FOUND_ROUNDS").unwrap_or(defaults.not_found_rounds),
            request_timeout: env_parse("POLL_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

/// Image preparation limits.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// Ceiling on the encoded JPEG size
    pub max_bytes: usize,
    pub initial_quality: u8,
    pub quality_step: u8,
    /// Lowest quality ever tried
    pub min_quality: u8,
    /// Base URL that relative references are resolved against
    pub public_base_url: String,
    pub fetch_timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            max_bytes: 7_500_000,
            initial_quality: 85,
            quality_step: 10,
            min_quality: 30,
            public_base_url: "http://localhost:8000".to_string(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl ImageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_width: env_parse("IMAGE_MAX_WIDTH").unwrap_or(defaults.max_width),
            max_height: env_parse("IMAGE_MAX_HEIGHT").unwrap_or(defaults.max_height),
            max_bytes: env_parse("IMAGE_MAX_BYTES").unwrap_or(defaults.max_bytes),
            initial_quality: env_parse("IMAGE_INITIAL_QUALITY").unwrap_or(defaults.initial_quality),
            quality_step: env_parse("IMAGE_QUALITY_STEP").unwrap_or(defaults.quality_step),
            min_quality: env_parse("IMAGE_MIN_QUALITY").unwrap_or(defaults.min_quality),
            public_base_url: env_string("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            fetch_timeout: defaults.fetch_timeout,
        }
    }
}

/// Credentials and endpoint for one remote service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Timeout for submit/generate requests
    pub timeout: Duration,
}

impl ServiceConfig {
    fn from_env(prefix: &str, base_url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            api_key: env_string(&format!("{prefix}_API_KEY")),
            base_url: env_string(&format!("{prefix}_BASE_URL"))
                .unwrap_or_else(|| base_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: env_string(&format!("{prefix}_MODEL")).unwrap_or_else(|| model.to_string()),
            timeout: Duration::from_secs(
                env_parse(&format!("{prefix}_TIMEOUT_SECS")).unwrap_or(timeout_secs),
            ),
        }
    }

    fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Point the service somewhere else (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub const RUNWAY_BASE_URL: &str = "https://api.dev.runwayml.com/v1";
pub const VEO3_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const KLING_BASE_URL: &str = "https://api.klingai.com";
pub const SEEDREAM_BASE_URL: &str = "https://ark.cn-beijing.volces.com";
pub const NANOBANANA_BASE_URL: &str = "https://api.nanobanana.ai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Runway API version header value.
pub const RUNWAY_API_VERSION: &str = "2024-11-06";

/// Kling signs its own JWTs from an access/secret key pair.
#[derive(Debug, Clone, Default)]
pub struct KlingKeys {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Voice settings for narration.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Configuration for every remote collaborator.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub runway: ServiceConfig,
    pub veo3: ServiceConfig,
    pub kling: ServiceConfig,
    pub kling_keys: KlingKeys,
    pub seedream: ServiceConfig,
    pub nanobanana: ServiceConfig,
    pub openai: ServiceConfig,
    pub elevenlabs: ServiceConfig,
    pub voice: VoiceConfig,
    pub poll: PollConfig,
    pub image: ImageConfig,
    /// Directory holding the background music library
    pub music_dir: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            runway: ServiceConfig::new(RUNWAY_BASE_URL, "gen4_turbo", 60),
            veo3: ServiceConfig::new(VEO3_BASE_URL, "veo3", 60),
            kling: ServiceConfig::new(KLING_BASE_URL, "kling-v1", 60),
            kling_keys: KlingKeys::default(),
            seedream: ServiceConfig::new(SEEDREAM_BASE_URL, "seedance-1-0-pro-250528", 60),
            nanobanana: ServiceConfig::new(NANOBANANA_BASE_URL, "clarity", 60),
            openai: ServiceConfig::new(OPENAI_BASE_URL, "gpt-4-turbo", 120),
            elevenlabs: ServiceConfig::new(ELEVENLABS_BASE_URL, "eleven_multilingual_v2", 30),
            voice: VoiceConfig::default(),
            poll: PollConfig::default(),
            image: ImageConfig::default(),
            music_dir: PathBuf::from("music"),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            runway: ServiceConfig::from_env("RUNWAY", RUNWAY_BASE_URL, &defaults.runway.model, 60),
            veo3: ServiceConfig::from_env("VEO3", VEO3_BASE_URL, &defaults.veo3.model, 60),
            kling: ServiceConfig::from_env("KLING", KLING_BASE_URL, &defaults.kling.model, 60),
            kling_keys: KlingKeys {
                access_key: env_string("KLING_ACCESS_KEY"),
                secret_key: env_string("KLING_SECRET_KEY"),
            },
            seedream: ServiceConfig::from_env(
                "SEEDREAM",
                SEEDREAM_BASE_URL,
                &defaults.seedream.model,
                60,
            ),
            nanobanana: ServiceConfig::from_env(
                "NANOBANANA",
                NANOBANANA_BASE_URL,
                &defaults.nanobanana.model,
                60,
            ),
            openai: ServiceConfig::from_env("OPENAI", OPENAI_BASE_URL, &defaults.openai.model, 120),
            elevenlabs: ServiceConfig::from_env(
                "ELEVENLABS",
                ELEVENLABS_BASE_URL,
                &defaults.elevenlabs.model,
                30,
            ),
            voice: VoiceConfig {
                voice_id: env_string("ELEVENLABS_VOICE_ID").unwrap_or(defaults.voice.voice_id),
                stability: env_parse("ELEVENLABS_STABILITY").unwrap_or(defaults.voice.stability),
                similarity_boost: env_parse("ELEVENLABS_SIMILARITY")
                    .unwrap_or(defaults.voice.similarity_boost),
            },
            poll: PollConfig::from_env(),
            image: ImageConfig::from_env(),
            music_dir: env_string("MUSIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.music_dir),
        }
    }
}
