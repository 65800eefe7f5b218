//! Planner script: scenes, shot descriptors, and the audio spec.
//!
//! The script is the planner's structured output, embedded in the job once
//! the planning stage completes. Validation here is the single gate between
//! the LLM's JSON and the paid generation stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Clip lengths the video model supports, in seconds.
pub const CLIP_DURATIONS_SECS: &[u32] = &[4, 6, 8];

/// Upper bound on a scene's generation prompt.
pub const MAX_GENERATION_PROMPT_CHARS: usize = 300;

/// Camera framing of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Wide,
    Medium,
    CloseUp,
    ExtremeCloseUp,
    OverTheShoulder,
    Pov,
    TwoShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CameraAngle {
    EyeLevel,
    LowAngle,
    HighAngle,
    Overhead,
    DutchAngle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CameraMove {
    Static,
    Pan,
    Tilt,
    DollyIn,
    DollyOut,
    Tracking,
    Crane,
    Handheld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Lighting {
    NaturalDaylight,
    GoldenHour,
    BlueHour,
    Studio,
    HighKey,
    LowKey,
    Neon,
    Candlelight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColorGrade {
    Warm,
    Cool,
    Neutral,
    HighContrast,
    Pastel,
    Monochrome,
    TealOrange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Uplifting,
    Calm,
    Energetic,
    Dramatic,
    Sincere,
    Playful,
    Luxurious,
    Reassuring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisualStyle {
    Cinematic,
    Documentary,
    Commercial,
    Lifestyle,
    Editorial,
    Macro,
}

/// Structured shot descriptors for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotDescriptors {
    pub shot_type: ShotType,
    pub camera_angle: CameraAngle,
    pub camera_move: CameraMove,
    pub lighting: Lighting,
    pub color_grade: ColorGrade,
    pub mood: Mood,
    pub visual_style: VisualStyle,
}

/// One contiguous sub-clip of the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// 1-based contiguous scene number
    pub scene_number: u32,
    /// Offset from the start of the video, seconds
    pub start_time_secs: f64,
    /// Clip length, restricted to `CLIP_DURATIONS_SECS`
    pub duration_secs: u32,
    /// Shot descriptors
    pub shot: ShotDescriptors,
    /// Prompt handed to the video model
    pub generation_prompt: String,
    /// Opening frame enforcing continuity with the previous scene.
    /// Resolved by the clip stage, not the planner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_image_url: Option<String>,
}

/// A point where audio and visuals must line up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncPoint {
    pub time_secs: f64,
    pub description: String,
}

/// Audio plan for the whole video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioSpec {
    /// Music mood keyword, e.g. "uplifting"
    pub music_mood: String,
    /// Music style keyword, e.g. "acoustic indie"
    pub music_style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voiceover_script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrator_script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer_start_offset_secs: Option<f64>,
    #[serde(default)]
    pub sync_points: Vec<SyncPoint>,
}

/// Global invariants every scene must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualConstants {
    /// Recurring subject description, e.g. "woman in her 30s, red jacket"
    pub subject_archetype: String,
    /// Brand color palette description
    pub brand_palette: String,
    /// How lighting evolves across the spot
    pub lighting_arc: String,
}

/// Planner output embedded in the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Script {
    pub title: String,
    pub total_duration_secs: u32,
    pub scenes: Vec<Scene>,
    pub audio_spec: AudioSpec,
    pub visual_constants: VisualConstants,
}

/// Script validation failures. All of these classify as `PlannerMalformed`
/// at the job level.
#[derive(Debug, Error, PartialEq)]
pub enum ScriptError {
    #[error("script has no scenes")]
    Empty,

    #[error("scene numbers not contiguous from 1: scene at index {index} is numbered {number}")]
    NonContiguous { index: usize, number: u32 },

    #[error("scene {scene} duration {duration}s not in the supported set {CLIP_DURATIONS_SECS:?}")]
    BadClipDuration { scene: u32, duration: u32 },

    #[error("scene {scene} has an empty generation prompt")]
    EmptyPrompt { scene: u32 },

    #[error("scene {scene} generation prompt exceeds {MAX_GENERATION_PROMPT_CHARS} characters")]
    PromptTooLong { scene: u32 },

    #[error("scene durations sum to {total}s, below the requested {requested}s")]
    TotalTooShort { total: u32, requested: u32 },

    #[error("{count} scenes planned for a {requested}s video, expected {min}-{max}")]
    SceneCount {
        count: usize,
        requested: u32,
        min: usize,
        max: usize,
    },

    #[error("scene {scene} start time {start}s does not follow the previous scene")]
    BadStartTime { scene: u32, start: f64 },
}

/// Expected scene-count range for a requested duration.
///
/// Matches the planner prompt's pacing guidance; anything outside the range
/// after reconciliation is a planner defect.
pub fn scene_count_range(duration_secs: u32) -> (usize, usize) {
    match duration_secs {
        0..=10 => (1, 2),
        11..=20 => (2, 3),
        21..=30 => (4, 5),
        31..=40 => (5, 6),
        41..=50 => (6, 7),
        _ => (7, 8),
    }
}

impl Script {
    /// Validate the script against the request it was planned for.
    pub fn validate(&self, requested_duration_secs: u32) -> Result<(), ScriptError> {
        if self.scenes.is_empty() {
            return Err(ScriptError::Empty);
        }

        let mut expected_start = 0.0_f64;
        for (index, scene) in self.scenes.iter().enumerate() {
            if scene.scene_number != (index as u32) + 1 {
                return Err(ScriptError::NonContiguous {
                    index,
                    number: scene.scene_number,
                });
            }
            if !CLIP_DURATIONS_SECS.contains(&scene.duration_secs) {
                return Err(ScriptError::BadClipDuration {
                    scene: scene.scene_number,
                    duration: scene.duration_secs,
                });
            }
            let prompt = scene.generation_prompt.trim();
            if prompt.is_empty() {
                return Err(ScriptError::EmptyPrompt {
                    scene: scene.scene_number,
                });
            }
            if prompt.chars().count() > MAX_GENERATION_PROMPT_CHARS {
                return Err(ScriptError::PromptTooLong {
                    scene: scene.scene_number,
                });
            }
            if (scene.start_time_secs - expected_start).abs() > 0.5 {
                return Err(ScriptError::BadStartTime {
                    scene: scene.scene_number,
                    start: scene.start_time_secs,
                });
            }
            expected_start += scene.duration_secs as f64;
        }

        let total: u32 = self.scenes.iter().map(|s| s.duration_secs).sum();
        if total < requested_duration_secs {
            return Err(ScriptError::TotalTooShort {
                total,
                requested: requested_duration_secs,
            });
        }

        let (min, max) = scene_count_range(requested_duration_secs);
        if !(min..=max).contains(&self.scenes.len()) {
            return Err(ScriptError::SceneCount {
                count: self.scenes.len(),
                requested: requested_duration_secs,
                min,
                max,
            });
        }

        Ok(())
    }

    /// Sum of planned scene durations.
    pub fn planned_duration_secs(&self) -> u32 {
        self.scenes.iter().map(|s| s.duration_secs).sum()
    }

    /// Recompute scene numbering and start times after reconciliation.
    pub fn renumber(&mut self) {
        let mut start = 0.0_f64;
        for (index, scene) in self.scenes.iter_mut().enumerate() {
            scene.scene_number = (index as u32) + 1;
            scene.start_time_secs = start;
            start += scene.duration_secs as f64;
        }
    }
}
