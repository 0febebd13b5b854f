//! Image-to-video generation backends.
//!
//! Every backend presents the same synchronous contract: submit an image and
//! a motion prompt, get back a reference to the finished clip. Backends that
//! answer with an operation handle are driven to completion through
//! [`crate::polling`].

mod kling;
mod runway;
mod seedream;
mod veo3;

pub use kling::KlingProvider;
pub use runway::RunwayProvider;
pub use seedream::SeedreamProvider;
pub use veo3::Veo3Provider;

use std::time::Instant;

use async_trait::async_trait;
use promoreel_models::{AspectRatio, ProviderKind};
use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics;
use crate::polling::{classify_status, extract_output, extract_status, TaskState};

/// Per-call generation knobs.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Overrides the configured model
    pub model: Option<String>,
    /// Requested clip length in seconds
    pub duration_secs: Option<f64>,
}

impl GenerationOptions {
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    /// Snap the requested duration to the 5s/10s clip lengths most
    /// backends accept.
    pub fn clip_length(&self) -> u32 {
        match self.duration_secs {
            Some(d) if d > 5.0 => 10,
            _ => 5,
        }
    }
}

/// Image-to-video backend.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Backend-native resolution string for an aspect ratio.
    fn resolution(&self, aspect_ratio: AspectRatio) -> &'static str;

    /// Generate a clip and return its reference.
    async fn generate_video(
        &self,
        image: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        options: &GenerationOptions,
    ) -> ProviderResult<String>;
}

/// Look up a ratio in a resolution table, falling back to the 16:9 entry.
pub(crate) fn resolve(table: &[(AspectRatio, &'static str)], aspect_ratio: AspectRatio) -> &'static str {
    table
        .iter()
        .find(|(ratio, _)| *ratio == aspect_ratio)
        .or_else(|| table.iter().find(|(ratio, _)| *ratio == AspectRatio::LANDSCAPE))
        .map(|(_, res)| *res)
        .unwrap_or("1280x720")
}

/// What a submit call handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Submission {
    /// The clip is already available
    Ready(String),
    /// Poll this operation handle
    Pending { operation: String },
}

const ID_KEYS: &[&str] = &["id", "task_id", "generation_id", "name"];

fn find_id(body: &Value) -> Option<String> {
    std::iter::once(body)
        .chain(body.get("data").filter(|d| d.is_object()))
        .find_map(|scope| {
            ID_KEYS.iter().find_map(|k| match scope.get(*k) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
        })
}

/// Normalize a submit response into a ready reference or a handle.
/// A terminal failure status wins over any id or output in the body.
pub(crate) fn interpret_submission(provider: &str, body: &Value) -> ProviderResult<Submission> {
    if classify_status(extract_status(body).as_deref()) == TaskState::Failed {
        return Err(ProviderError::GenerationFailed {
            operation: find_id(body).unwrap_or_else(|| "(none)".to_string()),
            message: body.to_string(),
        });
    }
    if let Some(url) = extract_output(body) {
        return Ok(Submission::Ready(url));
    }
    if let Some(operation) = find_id(body) {
        return Ok(Submission::Pending { operation });
    }
    Err(ProviderError::inconsistent(format!(
        "{} returned neither an output nor an operation handle: {}",
        provider, body
    )))
}

/// Record the outcome of a generation call.
pub(crate) fn observe<T>(kind: ProviderKind, started: Instant, result: &ProviderResult<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::record_request(kind.as_str(), outcome, started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE: &[(AspectRatio, &str)] = &[
        (AspectRatio::LANDSCAPE, "1280:720"),
        (AspectRatio::PORTRAIT, "720:1280"),
    ];

    #[test]
    fn test_resolve_falls_back_to_landscape() {
        assert_eq!(resolve(TABLE, AspectRatio::PORTRAIT), "720:1280");
        assert_eq!(resolve(TABLE, AspectRatio::new(5, 4)), "1280:720");
    }

    #[test]
    fn test_interpret_submission() {
        assert_eq!(
            interpret_submission("x", &json!({"output": ["https://a/v.mp4"]})).unwrap(),
            Submission::Ready("https://a/v.mp4".into())
        );
        assert_eq!(
            interpret_submission("x", &json!({"id": "task-1"})).unwrap(),
            Submission::Pending {
                operation: "task-1".into()
            }
        );
        assert_eq!(
            interpret_submission("x", &json!({"code": 0, "data": {"task_id": "k-9"}})).unwrap(),
            Submission::Pending {
                operation: "k-9".into()
            }
        );
        assert!(matches!(
            interpret_submission("x", &json!({"status": "failed"})),
            Err(ProviderError::GenerationFailed { .. })
        ));
        assert!(matches!(
            interpret_submission("x", &json!({"status": "queued"})),
            Err(ProviderError::InconsistentResponse(_))
        ));
    }

    #[test]
    fn test_failed_submission_with_handle_is_not_polled() {
        let err = interpret_submission("x", &json!({"id": "task-7", "status": "FAILED"})).unwrap_err();
        assert!(
            matches!(&err, ProviderError::GenerationFailed { operation, .. } if operation == "task-7"),
            "{err:?}"
        );
        assert!(matches!(
            interpret_submission("x", &json!({"data": {"task_id": "k-1", "task_status": "failed"}})),
            Err(ProviderError::GenerationFailed { .. })
        ));
        assert_eq!(
            interpret_submission("x", &json!({"id": "task-8", "status": "pending"})).unwrap(),
            Submission::Pending {
                operation: "task-8".into()
            }
        );
    }

    #[test]
    fn test_clip_length() {
        assert_eq!(GenerationOptions::default().clip_length(), 5);
        assert_eq!(GenerationOptions::default().with_duration(4.0).clip_length(), 5);
        assert_eq!(GenerationOptions::default().with_duration(7.5).clip_length(), 10);
    }
}
