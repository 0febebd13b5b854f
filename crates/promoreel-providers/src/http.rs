//! Shared HTTP plumbing for provider clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};

/// Build a client with a bounded request timeout.
pub fn build_client(timeout: Duration) -> ProviderResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ProviderError::Network)
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error"))
            .or_else(|| v.get("detail"))
            .map(|m| match m {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    });
    let mut message = message.unwrap_or_else(|| body.trim().to_string());
    if message.len() > 500 {
        let mut cut = 500;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}

/// Map a non-success response onto the provider error taxonomy.
pub async fn ensure_success(provider: &str, response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::auth(provider, format!("{}: {}", status, message))
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::PAYMENT_REQUIRED => {
            let lower = body.to_lowercase();
            if lower.contains("credit") || lower.contains("insufficient") {
                ProviderError::validation(provider, format!("insufficient credits: {}", message))
            } else {
                ProviderError::validation(provider, message)
            }
        }
        _ => ProviderError::request_failed(format!("{} returned {}: {}", provider, status, message)),
    })
}

/// Fail early when a provider has no credentials configured.
pub fn require_key<'a>(provider: &str, key: Option<&'a str>) -> ProviderResult<&'a str> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::auth(provider, "API key is not configured"))
}
