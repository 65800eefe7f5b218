//! Pipeline stage machine.
//!
//! A job moves through a strictly linear sequence of stages. The optional
//! stages advance their marker without producing artifacts when the job
//! does not request them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of a job in the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Script planning via the LLM planner
    #[default]
    Planning,
    /// Per-scene video clip generation with frame chaining
    ClipGeneration,
    /// Background music bed generation (optional)
    MusicGeneration,
    /// Disclaimer tier selection and text preparation (pharma only)
    DisclaimerPlanning,
    /// Narration / disclaimer TTS synthesis (pharma only)
    NarrationSynthesis,
    /// Final concat + trim + audio mix
    Composition,
    /// Terminal pipeline position
    Complete,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ORDER: &'static [Stage] = &[
        Stage::Planning,
        Stage::ClipGeneration,
        Stage::MusicGeneration,
        Stage::DisclaimerPlanning,
        Stage::NarrationSynthesis,
        Stage::Composition,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::ClipGeneration => "clip_generation",
            Stage::MusicGeneration => "music_generation",
            Stage::DisclaimerPlanning => "disclaimer_planning",
            Stage::NarrationSynthesis => "narration_synthesis",
            Stage::Composition => "composition",
            Stage::Complete => "complete",
        }
    }

    /// Human-readable label shown to polling clients.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Planning => "Planning script",
            Stage::ClipGeneration => "Generating scene clips",
            Stage::MusicGeneration => "Generating music",
            Stage::DisclaimerPlanning => "Preparing disclaimer",
            Stage::NarrationSynthesis => "Synthesizing narration",
            Stage::Composition => "Composing final video",
            Stage::Complete => "Complete",
        }
    }

    /// Zero-based index in `ORDER`.
    pub fn index(&self) -> usize {
        Stage::ORDER.iter().position(|s| s == self).unwrap_or(0)
    }

    /// The stage that follows this one, or `None` at the end of the line.
    pub fn next(&self) -> Option<Stage> {
        Stage::ORDER.get(self.index() + 1).copied()
    }

    /// True when the stage may advance without artifacts for jobs that
    /// did not request it.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Stage::MusicGeneration | Stage::DisclaimerPlanning | Stage::NarrationSynthesis
        )
    }

    /// True when this stage issues paid external model calls. Quota is
    /// never credited back once a job has entered a paid stage.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Stage::Planning | Stage::Complete)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ORDER
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_linear() {
        let mut stage = Stage::Planning;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next.index() == stage.index() + 1);
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, Stage::ORDER);
        assert_eq!(stage, Stage::Complete);
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in Stage::ORDER {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), *stage);
        }
        assert!("rendering".parse::<Stage>().is_err());
    }

    #[test]
    fn test_skippable_stages() {
        assert!(Stage::MusicGeneration.is_skippable());
        assert!(Stage::DisclaimerPlanning.is_skippable());
        assert!(Stage::NarrationSynthesis.is_skippable());
        assert!(!Stage::Planning.is_skippable());
        assert!(!Stage::ClipGeneration.is_skippable());
        assert!(!Stage::Composition.is_skippable());
    }

    #[test]
    fn test_planning_is_unpaid() {
        assert!(!Stage::Planning.is_paid());
        assert!(Stage::ClipGeneration.is_paid());
        assert!(Stage::Composition.is_paid());
    }
}
