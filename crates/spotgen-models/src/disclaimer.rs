//! Disclaimer tier selection and narration budget math.
//!
//! Tier selection is a pure function of video duration so compliance
//! behavior stays testable without any IO. The only external dependency in
//! the disclaimer path is the LLM compression used for the `short` tier,
//! which lives in the worker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback speed applied to spoken disclaimer audio.
pub const DISCLAIMER_PLAYBACK_SPEED: f64 = 1.4;

/// Average spoken-word rate used for narration budgeting.
pub const WORDS_PER_SECOND: f64 = 2.5;

/// How the disclaimer is delivered, by total video duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisclaimerTier {
    /// Full disclaimer spoken verbatim (D >= 30s)
    Full,
    /// 12-18 word compliant compression (15s <= D < 30s)
    Short,
    /// Abbreviated textual overlay only, no audio (D < 15s)
    TextOnly,
}

impl DisclaimerTier {
    /// Select the tier for a video of the given duration.
    pub fn for_duration(duration_secs: u32) -> Self {
        match duration_secs {
            0..=14 => DisclaimerTier::TextOnly,
            15..=29 => DisclaimerTier::Short,
            _ => DisclaimerTier::Full,
        }
    }

    /// True when this tier produces spoken audio.
    pub fn has_audio(&self) -> bool {
        !matches!(self, DisclaimerTier::TextOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisclaimerTier::Full => "full",
            DisclaimerTier::Short => "short",
            DisclaimerTier::TextOnly => "text_only",
        }
    }
}

impl fmt::Display for DisclaimerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Disclaimer plan persisted on the job after the planning stage.
///
/// `audio_duration_secs` is the measured duration of the synthesized audio,
/// not a prediction; the compositor schedules the mix from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DisclaimerSpec {
    pub tier: DisclaimerTier,
    /// Text actually spoken (or overlaid for `text_only`)
    pub spoken_text: String,
    /// Measured audio duration; 0 for `text_only`
    pub audio_duration_secs: f64,
    /// Playback speed the audio was synthesized at
    pub playback_speed: f64,
}

impl DisclaimerSpec {
    /// Start offset of the disclaimer audio in the final mix.
    pub fn audio_start_secs(&self, video_duration_secs: u32) -> f64 {
        video_duration_secs as f64 - self.audio_duration_secs - music_tail_secs(video_duration_secs)
    }
}

/// Seconds reserved at the end of the video for a music-only outro.
pub fn music_tail_secs(duration_secs: u32) -> f64 {
    (duration_secs as f64 / 30.0).clamp(1.0, 2.0)
}

/// Seconds available for main narration once the disclaimer and the music
/// tail are carved out.
pub fn narration_budget_secs(duration_secs: u32, disclaimer_audio_secs: f64) -> f64 {
    (duration_secs as f64 - disclaimer_audio_secs - music_tail_secs(duration_secs)).max(0.0)
}

/// Word budget for the narrator script.
pub fn narration_budget_words(budget_secs: f64) -> u32 {
    (budget_secs * WORDS_PER_SECOND).floor().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(DisclaimerTier::for_duration(14), DisclaimerTier::TextOnly);
        assert_eq!(DisclaimerTier::for_duration(15), DisclaimerTier::Short);
        assert_eq!(DisclaimerTier::for_duration(29), DisclaimerTier::Short);
        assert_eq!(DisclaimerTier::for_duration(30), DisclaimerTier::Full);
        assert_eq!(DisclaimerTier::for_duration(60), DisclaimerTier::Full);
    }

    #[test]
    fn test_music_tail_clamp() {
        assert!((music_tail_secs(15) - 1.0).abs() < 1e-9);
        assert!((music_tail_secs(45) - 1.5).abs() < 1e-9);
        assert!((music_tail_secs(60) - 2.0).abs() < 1e-9);
        assert!((music_tail_secs(90) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_narration_budget() {
        // D=30, disclaimer 5s, tail 1.0 -> 24s of narration, 60 words
        let secs = narration_budget_secs(30, 5.0);
        assert!((secs - 24.0).abs() < 1e-9);
        assert_eq!(narration_budget_words(secs), 60);
    }

    #[test]
    fn test_narration_budget_never_negative() {
        let secs = narration_budget_secs(10, 20.0);
        assert_eq!(secs, 0.0);
        assert_eq!(narration_budget_words(secs), 0);
    }

    #[test]
    fn test_audio_start_offset() {
        let spec = DisclaimerSpec {
            tier: DisclaimerTier::Full,
            spoken_text: "May cause drowsiness.".to_string(),
            audio_duration_secs: 6.5,
            playback_speed: DISCLAIMER_PLAYBACK_SPEED,
        };
        // 30 - 6.5 - 1.0
        assert!((spec.audio_start_secs(30) - 22.5).abs() < 1e-9);
    }
}
