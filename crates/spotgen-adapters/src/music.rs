//! Music model adapter and prompt derivation.

use crate::error::AdapterResult;
use crate::prediction::{Prediction, PredictionClient};

/// Bounds imposed by the music endpoint on its prompt.
pub const MIN_MUSIC_PROMPT_CHARS: usize = 10;
pub const MAX_MUSIC_PROMPT_CHARS: usize = 300;

/// Keywords lifted from the user prompt into the music prompt.
const MAX_PROMPT_KEYWORDS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "for", "with", "about", "into", "over", "after", "of",
    "to", "in", "on", "at", "by", "is", "are", "was", "be", "this", "that", "it", "its", "as",
    "from", "second", "seconds", "ad", "advert", "advertisement", "video", "commercial", "spot",
];

/// Façade over the music generation endpoint.
#[derive(Clone)]
pub struct MusicAdapter {
    client: PredictionClient,
}

impl MusicAdapter {
    pub fn new(client: PredictionClient) -> Self {
        Self { client }
    }

    /// Submit a music bed for generation.
    pub async fn submit_music(
        &self,
        prompt: &str,
        duration_secs: u32,
    ) -> AdapterResult<Prediction> {
        let input = serde_json::json!({
            "prompt": prompt,
            "duration": duration_secs,
            "lyrics": structure_tags(duration_secs),
            "instrumental": true,
        });
        self.client.submit(input).await
    }

    pub fn client(&self) -> &PredictionClient {
        &self.client
    }
}

/// Derive the music prompt from the script's style/mood plus up to three
/// salient keywords from the user prompt, clamped to the endpoint's bounds.
pub fn build_music_prompt(style: &str, mood: &str, user_prompt: &str) -> String {
    let mut prompt = format!("{style}, {mood}");

    let keywords: Vec<&str> = user_prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .take(MAX_PROMPT_KEYWORDS)
        .collect();
    if !keywords.is_empty() {
        prompt.push_str(", ");
        prompt.push_str(&keywords.join(" "));
    }

    if prompt.chars().count() > MAX_MUSIC_PROMPT_CHARS {
        prompt = prompt.chars().take(MAX_MUSIC_PROMPT_CHARS).collect();
    }
    if prompt.chars().count() < MIN_MUSIC_PROMPT_CHARS {
        prompt.push_str(", instrumental background");
    }
    prompt
}

/// Structural lyrics skeleton for the requested duration.
pub fn structure_tags(duration_secs: u32) -> &'static str {
    match duration_secs {
        0..=15 => "[intro][verse][outro]",
        16..=30 => "[intro][verse][chorus][outro]",
        31..=60 => "[intro][verse][chorus][verse][outro]",
        _ => "[intro][verse][chorus][bridge][verse][chorus][outro]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_combines_style_mood_keywords() {
        let prompt = build_music_prompt(
            "acoustic indie",
            "uplifting",
            "30-second cinematic ad for an eco-friendly stainless steel water bottle",
        );
        assert!(prompt.starts_with("acoustic indie, uplifting"));
        assert!(prompt.contains("cinematic"));
        // stop words and short tokens filtered out
        assert!(!prompt.contains(" for "));
        assert!(prompt.chars().count() <= MAX_MUSIC_PROMPT_CHARS);
    }

    #[test]
    fn test_prompt_clamped_to_bounds() {
        let long_style = "x".repeat(400);
        let prompt = build_music_prompt(&long_style, "calm", "prompt");
        assert_eq!(prompt.chars().count(), MAX_MUSIC_PROMPT_CHARS);

        let short = build_music_prompt("a", "b", "");
        assert!(short.chars().count() >= MIN_MUSIC_PROMPT_CHARS);
    }

    #[test]
    fn test_structure_grows_with_duration() {
        assert_eq!(structure_tags(15), "[intro][verse][outro]");
        assert_eq!(structure_tags(30), "[intro][verse][chorus][outro]");
        assert_eq!(structure_tags(60), "[intro][verse][chorus][verse][outro]");
        assert_eq!(
            structure_tags(90),
            "[intro][verse][chorus][bridge][verse][chorus][outro]"
        );
    }

    #[test]
    fn test_keyword_cap() {
        let prompt = build_music_prompt(
            "pop",
            "happy",
            "sparkling refreshing delicious energizing wonderful beverage",
        );
        let tail = prompt.split(", ").nth(2).unwrap();
        assert_eq!(tail.split(' ').count(), MAX_PROMPT_KEYWORDS);
    }
}
