//! Ad submission request and validation rules.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minimum supported video duration in seconds.
pub const MIN_DURATION_SECS: u32 = 10;
/// Maximum supported video duration in seconds.
pub const MAX_DURATION_SECS: u32 = 60;

const MIN_PROMPT_CHARS: u64 = 10;
const MAX_PROMPT_CHARS: u64 = 2000;

/// Output frame aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    /// Landscape 16:9
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// Portrait 9:16
    #[serde(rename = "9:16")]
    Portrait,
    /// Square 1:1
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }

    /// Output pixel dimensions at the pipeline's working resolution.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Square => (1080, 1080),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid aspect ratio: {0}")]
pub struct ParseAspectRatioError(String);

impl FromStr for AspectRatio {
    type Err = ParseAspectRatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            "1:1" => Ok(AspectRatio::Square),
            other => Err(ParseAspectRatioError(other.to_string())),
        }
    }
}

/// Errors produced by request validation.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("prompt must be {MIN_PROMPT_CHARS}-{MAX_PROMPT_CHARS} characters")]
    PromptLength,

    #[error("duration must be {MIN_DURATION_SECS}-{MAX_DURATION_SECS} seconds in steps of 10, got {0}")]
    BadDuration(u32),

    #[error("invalid URL in {field}: {url}")]
    BadUrl { field: &'static str, url: String },

    #[error("disclaimer text must not be blank when present")]
    BlankDisclaimer,
}

/// The frozen submission carried by a job for its whole lifetime.
///
/// `check()` is the validation gate; Submit rejects anything it flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdRequest {
    /// Free-form ad brief (10-2000 characters)
    pub prompt: String,

    /// Requested video duration in seconds (10-60, multiple of 10)
    pub duration_secs: u32,

    /// Output aspect ratio
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Optional opening frame for the first scene
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_image_url: Option<String>,

    /// Optional style reference image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_reference_url: Option<String>,

    /// Verbatim regulatory disclaimer text; presence switches the job into
    /// pharmaceutical mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer_text: Option<String>,

    /// Caller-supplied idempotency key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

fn duration_is_valid(duration: u32) -> bool {
    (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration) && duration % 10 == 0
}

impl AdRequest {
    /// Full validation of the submission. Returns the first violated rule.
    pub fn check(&self) -> Result<(), RequestError> {
        let prompt_chars = self.prompt.chars().count() as u64;
        if !(MIN_PROMPT_CHARS..=MAX_PROMPT_CHARS).contains(&prompt_chars) {
            return Err(RequestError::PromptLength);
        }
        if !duration_is_valid(self.duration_secs) {
            return Err(RequestError::BadDuration(self.duration_secs));
        }
        for (field, value) in [
            ("start_image_url", &self.start_image_url),
            ("style_reference_url", &self.style_reference_url),
        ] {
            if let Some(raw) = value {
                if url::Url::parse(raw).is_err() {
                    return Err(RequestError::BadUrl {
                        field,
                        url: raw.clone(),
                    });
                }
            }
        }
        if let Some(text) = &self.disclaimer_text {
            if text.trim().is_empty() {
                return Err(RequestError::BlankDisclaimer);
            }
        }
        Ok(())
    }

    /// True when the submission carries regulated disclaimer text.
    pub fn pharma_mode(&self) -> bool {
        self.disclaimer_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(duration: u32) -> AdRequest {
        AdRequest {
            prompt: "30-second cinematic ad for an eco-friendly water bottle".to_string(),
            duration_secs: duration,
            aspect_ratio: AspectRatio::Landscape,
            start_image_url: None,
            style_reference_url: None,
            disclaimer_text: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request(30).check().is_ok());
        assert!(request(10).check().is_ok());
        assert!(request(60).check().is_ok());
    }

    #[test]
    fn test_duration_bounds() {
        assert!(matches!(request(0).check(), Err(RequestError::BadDuration(0))));
        assert!(matches!(request(15).check(), Err(RequestError::BadDuration(15))));
        assert!(matches!(request(70).check(), Err(RequestError::BadDuration(70))));
    }

    #[test]
    fn test_prompt_length() {
        let mut req = request(30);
        req.prompt = "too short".to_string();
        assert!(matches!(req.check(), Err(RequestError::PromptLength)));

        req.prompt = "x".repeat(2001);
        assert!(matches!(req.check(), Err(RequestError::PromptLength)));
    }

    #[test]
    fn test_bad_start_image_url() {
        let mut req = request(30);
        req.start_image_url = Some("not a url".to_string());
        assert!(matches!(req.check(), Err(RequestError::BadUrl { .. })));
    }

    #[test]
    fn test_blank_disclaimer_rejected() {
        let mut req = request(30);
        req.disclaimer_text = Some("   ".to_string());
        assert!(matches!(req.check(), Err(RequestError::BlankDisclaimer)));
        assert!(!req.pharma_mode());

        req.disclaimer_text = Some("May cause drowsiness.".to_string());
        assert!(req.check().is_ok());
        assert!(req.pharma_mode());
    }

    #[test]
    fn test_aspect_ratio_serde() {
        let json = serde_json::to_string(&AspectRatio::Portrait).unwrap();
        assert_eq!(json, "\"9:16\"");
        let parsed: AspectRatio = serde_json::from_str("\"1:1\"").unwrap();
        assert_eq!(parsed, AspectRatio::Square);
    }
}
