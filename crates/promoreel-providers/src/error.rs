//! Provider error types.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} authentication failed: {message}")]
    Auth { provider: String, message: String },

    #[error("{provider} rejected the request: {message}")]
    Validation { provider: String, message: String },

    #[error("operation {operation} did not finish after {attempts} polls")]
    Timeout { operation: String, attempts: u32 },

    #[error("no status endpoint recognizes operation {operation}")]
    PollingEndpoint { operation: String },

    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    #[error("generation failed for operation {operation}: {message}")]
    GenerationFailed { operation: String, message: String },

    #[error("inconsistent response: {0}")]
    InconsistentResponse(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn validation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn image(message: impl Into<String>) -> Self {
        Self::ImageProcessing(message.into())
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::InconsistentResponse(message.into())
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed(message.into())
    }

    /// Transient errors worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth { .. } => "auth",
            ProviderError::Validation { .. } => "validation",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::PollingEndpoint { .. } => "polling_endpoint",
            ProviderError::ImageProcessing(_) => "image_processing",
            ProviderError::GenerationFailed { .. } => "generation_failed",
            ProviderError::InconsistentResponse(_) => "inconsistent_response",
            ProviderError::RequestFailed(_) => "request_failed",
            ProviderError::Network(_) => "network",
            ProviderError::Json(_) => "json",
        }
    }
}
