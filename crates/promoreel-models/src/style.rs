//! Aspect ratio tokens and presentation styles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Requested output aspect ratio, carried on the wire as a `"W:H"` token.
///
/// Any positive `W:H` pair parses; the well-known ratios have fixed
/// provider resolutions and output frames, everything else falls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Landscape (16:9), the universal fallback.
    pub const LANDSCAPE: AspectRatio = AspectRatio::new(16, 9);
    /// Portrait (9:16) for Reels/TikTok/Shorts
    pub const PORTRAIT: AspectRatio = AspectRatio::new(9, 16);
    /// Square (1:1)
    pub const SQUARE: AspectRatio = AspectRatio::new(1, 1);
    /// Classic (4:3)
    pub const CLASSIC: AspectRatio = AspectRatio::new(4, 3);
    /// Classic portrait (3:4)
    pub const CLASSIC_PORTRAIT: AspectRatio = AspectRatio::new(3, 4);
    /// Ultrawide (21:9)
    pub const ULTRAWIDE: AspectRatio = AspectRatio::new(21, 9);

    /// Ratios every provider has a native resolution for.
    pub const KNOWN: &'static [AspectRatio] = &[
        AspectRatio::LANDSCAPE,
        AspectRatio::PORTRAIT,
        AspectRatio::SQUARE,
        AspectRatio::CLASSIC,
        AspectRatio::CLASSIC_PORTRAIT,
        AspectRatio::ULTRAWIDE,
    ];

    /// Create a new aspect ratio.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The `"W:H"` token.
    pub fn token(&self) -> String {
        self.to_string()
    }

    /// Token safe for object keys and filenames (`16x9`).
    pub fn as_filename_part(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(self)
    }

    /// Fixed output frame for the ratios the assembly pipeline renders natively.
    pub fn output_dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (9, 16) => Some((1080, 1920)),
            (1, 1) => Some((1080, 1080)),
            (16, 9) => Some((1920, 1080)),
            _ => None,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError::InvalidFormat(s.to_string()))?;

        let width = w
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(w.to_string()))?;
        let height = h
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(h.to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }

        Ok(AspectRatio { width, height })
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = AspectRatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

impl JsonSchema for AspectRatio {
    fn schema_name() -> String {
        "AspectRatio".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::LANDSCAPE
    }
}

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio cannot have zero values")]
    ZeroValue,
}

/// Subtitle rendering profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleStyle {
    /// Large, outlined, screen-centered captions
    #[default]
    LargeCentered,
    /// Plain bottom captions
    Default,
}

impl SubtitleStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleStyle::LargeCentered => "large_centered",
            SubtitleStyle::Default => "default",
        }
    }
}

impl fmt::Display for SubtitleStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubtitleStyle {
    type Err = SubtitleStyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "large_centered" => Ok(SubtitleStyle::LargeCentered),
            "default" => Ok(SubtitleStyle::Default),
            _ => Err(SubtitleStyleParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown subtitle style: {0}")]
pub struct SubtitleStyleParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::PORTRAIT);
        assert_eq!(" 1:1 ".parse::<AspectRatio>().unwrap(), AspectRatio::SQUARE);
        assert_eq!("5:4".parse::<AspectRatio>().unwrap(), AspectRatio::new(5, 4));
        assert!("invalid".parse::<AspectRatio>().is_err());
        assert!("0:16".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_aspect_ratio_serializes_as_token() {
        let json = serde_json::to_string(&AspectRatio::ULTRAWIDE).unwrap();
        assert_eq!(json, "\"21:9\"");

        let parsed: Vec<AspectRatio> = serde_json::from_str(r#"["16:9","3:4"]"#).unwrap();
        assert_eq!(parsed, vec![AspectRatio::LANDSCAPE, AspectRatio::CLASSIC_PORTRAIT]);

        assert!(serde_json::from_str::<AspectRatio>("\"wide\"").is_err());
    }

    #[test]
    fn test_output_dimensions() {
        assert_eq!(AspectRatio::PORTRAIT.output_dimensions(), Some((1080, 1920)));
        assert_eq!(AspectRatio::SQUARE.output_dimensions(), Some((1080, 1080)));
        assert_eq!(AspectRatio::LANDSCAPE.output_dimensions(), Some((1920, 1080)));
        assert_eq!(AspectRatio::CLASSIC.output_dimensions(), None);
    }

    #[test]
    fn test_filename_part() {
        assert_eq!(AspectRatio::PORTRAIT.as_filename_part(), "9x16");
        assert!(!AspectRatio::new(5, 4).is_known());
    }

    #[test]
    fn test_subtitle_style_parse() {
        assert_eq!(
            "LARGE_CENTERED".parse::<SubtitleStyle>().unwrap(),
            SubtitleStyle::LargeCentered
        );
        assert!("fancy".parse::<SubtitleStyle>().is_err());
    }
}
