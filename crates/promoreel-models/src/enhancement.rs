//! Per-image enhancement results.

use serde::{Deserialize, Serialize};

/// Outcome of enhancing one input image.
///
/// Enhancement never fails a job: on any remote error the original
/// reference is carried forward with the error attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub original: String,
    pub enhanced: String,
    #[serde(default)]
    pub variations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnhancementResult {
    /// Pass-through result when enhancement did not run or failed.
    pub fn fallback(original: impl Into<String>, error: Option<String>) -> Self {
        let original = original.into();
        Self {
            enhanced: original.clone(),
            original,
            variations: Vec::new(),
            annotated: None,
            error,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// The reference downstream stages should animate.
    pub fn best(&self) -> &str {
        self.annotated.as_deref().unwrap_or(&self.enhanced)
    }
}
