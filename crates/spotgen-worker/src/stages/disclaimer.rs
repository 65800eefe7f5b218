//! Disclaimer planning stage (pharmaceutical mode only).
//!
//! Tier selection is a pure function of duration; the only IO here is the
//! LLM compression for the `short` tier.

use serde::Deserialize;
use tracing::warn;

use spotgen_adapters::extract_and_parse;
use spotgen_models::{DisclaimerSpec, DisclaimerTier, Job, DISCLAIMER_PLAYBACK_SPEED};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};

/// Word band the compressed short disclaimer must land in.
const SHORT_MIN_WORDS: usize = 12;
const SHORT_MAX_WORDS: usize = 18;

/// Character cap for the text-only overlay.
const OVERLAY_MAX_CHARS: usize = 120;

/// Low temperature: compression must stay faithful, not creative.
const COMPRESSION_TEMPERATURE: f64 = 0.2;

const COMPRESSION_SYSTEM_PROMPT: &str = r#"You compress pharmaceutical safety disclaimers for short advertisements.
Rewrite the given disclaimer in 12-18 words, preserving every named risk.
Never add, soften, or omit a risk. Return ONLY a JSON object:
{"short_disclaimer": "..."}"#;

#[derive(Debug, Deserialize)]
struct CompressionResponse {
    short_disclaimer: String,
}

pub async fn run(ctx: &ProcessingContext, job: &Job) -> WorkerResult<DisclaimerSpec> {
    let text = job
        .request
        .disclaimer_text
        .clone()
        .ok_or_else(|| WorkerError::internal("disclaimer stage entered without text"))?;

    let tier = DisclaimerTier::for_duration(job.request.duration_secs);

    let spoken_text = match tier {
        DisclaimerTier::Full => text,
        DisclaimerTier::Short => compress(ctx, &text).await?,
        DisclaimerTier::TextOnly => overlay_text(&text),
    };

    Ok(DisclaimerSpec {
        tier,
        spoken_text,
        // Measured after synthesis; stays 0 for text_only
        audio_duration_secs: 0.0,
        playback_speed: DISCLAIMER_PLAYBACK_SPEED,
    })
}

/// Compress the disclaimer via the planner LLM, falling back to a plain
/// truncation when the model cannot hit the word band.
async fn compress(ctx: &ProcessingContext, text: &str) -> WorkerResult<String> {
    let user_prompt = format!("Disclaimer:\n{text}");

    let raw = ctx
        .planner
        .generate_json(COMPRESSION_SYSTEM_PROMPT, &user_prompt, COMPRESSION_TEMPERATURE)
        .await?;
    let parsed: CompressionResponse = extract_and_parse(&raw)?;

    let compressed = parsed.short_disclaimer.trim().to_string();
    let words = compressed.split_whitespace().count();
    if (SHORT_MIN_WORDS..=SHORT_MAX_WORDS).contains(&words) {
        return Ok(compressed);
    }

    warn!(
        words,
        "Short disclaimer outside the {SHORT_MIN_WORDS}-{SHORT_MAX_WORDS} word band, truncating"
    );
    Ok(truncate_words(text, SHORT_MAX_WORDS))
}

/// Abbreviated textual overlay for sub-15s spots.
fn overlay_text(text: &str) -> String {
    let first_sentence = text
        .split_inclusive(['.', ';'])
        .next()
        .unwrap_or(text)
        .trim();
    if first_sentence.chars().count() <= OVERLAY_MAX_CHARS {
        first_sentence.to_string()
    } else {
        let truncated: String = first_sentence.chars().take(OVERLAY_MAX_CHARS - 1).collect();
        format!("{}…", truncated.trim_end())
    }
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_first_sentence() {
        let text = "May cause drowsiness. Do not operate heavy machinery.";
        assert_eq!(overlay_text(text), "May cause drowsiness.");
    }

    #[test]
    fn test_overlay_truncates_long_sentences() {
        let text = "x".repeat(300);
        let overlay = overlay_text(&text);
        assert!(overlay.chars().count() <= OVERLAY_MAX_CHARS);
        assert!(overlay.ends_with('…'));
    }

    #[test]
    fn test_truncate_words() {
        let text = "one two three four five";
        assert_eq!(truncate_words(text, 3), "one two three");
        assert_eq!(truncate_words(text, 10), text);
    }
}
