//! Shared data models for the Spotgen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, the pipeline stage machine, and structured job errors
//! - Ad submission requests and their validation rules
//! - Planner scripts (scenes, shot descriptors, audio spec)
//! - Disclaimer tiers and narration budget math
//! - Monthly usage/quota records
//! - Client-visible progress projection

pub mod disclaimer;
pub mod error;
pub mod job;
pub mod progress;
pub mod request;
pub mod script;
pub mod stage;
pub mod usage;

// Re-export common types
pub use disclaimer::{
    music_tail_secs, narration_budget_secs, narration_budget_words, DisclaimerSpec,
    DisclaimerTier, DISCLAIMER_PLAYBACK_SPEED, WORDS_PER_SECOND,
};
pub use error::{JobError, JobErrorKind};
pub use job::{
    derive_idempotency_key, InflightPrediction, Job, JobId, JobStatus, JOB_TTL_DAYS,
    SCRIPT_TTL_DAYS,
};
pub use progress::{default_eta_secs, project_progress, stage_floor_secs, stage_weight, Progress};
pub use request::{AdRequest, AspectRatio, RequestError, MAX_DURATION_SECS, MIN_DURATION_SECS};
pub use script::{
    scene_count_range, AudioSpec, CameraAngle, CameraMove, ColorGrade, Lighting, Mood, Scene,
    Script, ScriptError, ShotDescriptors, ShotType, SyncPoint, VisualConstants, VisualStyle,
    CLIP_DURATIONS_SECS, MAX_GENERATION_PROMPT_CHARS,
};
pub use stage::Stage;
pub use usage::{current_period, usage_doc_id, PlanTier, Usage};
