//! API key loading.
//!
//! Keys are fetched once at startup from the environment-backed secret
//! store and cached in-process; adapters never read the environment on the
//! request path.

use crate::error::{AdapterError, AdapterResult};

/// API keys for every external endpoint, loaded at startup.
#[derive(Clone)]
pub struct Secrets {
    pub planner_api_key: String,
    pub video_api_key: String,
    pub music_api_key: String,
    pub tts_api_key: String,
}

impl Secrets {
    /// Load all keys, failing fast on the first missing one.
    pub fn from_env() -> AdapterResult<Self> {
        Ok(Self {
            planner_api_key: require("PLANNER_API_KEY")?,
            video_api_key: require("VIDEO_MODEL_API_KEY")?,
            music_api_key: require("MUSIC_MODEL_API_KEY")?,
            tts_api_key: require("TTS_API_KEY")?,
        })
    }
}

impl std::fmt::Debug for Secrets {
    // Keys never reach logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

fn require(name: &str) -> AdapterResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AdapterError::Auth(format!("{name} not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_keys() {
        let secrets = Secrets {
            planner_api_key: "sk-planner".to_string(),
            video_api_key: "sk-video".to_string(),
            music_api_key: "sk-music".to_string(),
            tts_api_key: "sk-tts".to_string(),
        };
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("sk-planner"));
        assert!(!rendered.contains("sk-video"));
    }
}
