//! Video generation backend selection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Image-to-video backend used for clip generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Runway,
    Veo3,
    Kling,
    #[default]
    Seedream,
}

impl ProviderKind {
    pub const ALL: &'static [ProviderKind] = &[
        ProviderKind::Runway,
        ProviderKind::Veo3,
        ProviderKind::Kling,
        ProviderKind::Seedream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Runway => "runway",
            ProviderKind::Veo3 => "veo3",
            ProviderKind::Kling => "kling",
            ProviderKind::Seedream => "seedream",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "runway" | "runwayml" => Ok(ProviderKind::Runway),
            "veo3" | "veo" => Ok(ProviderKind::Veo3),
            "kling" => Ok(ProviderKind::Kling),
            "seedream" | "seedance" => Ok(ProviderKind::Seedream),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown video provider: {0}")]
pub struct ProviderParseError(String);
