//! Client-visible progress projection.
//!
//! Progress is a pure function of the job record: a fixed weight map over
//! completed stages with within-stage interpolation for clip generation.
//! Because the stage marker only ever advances and `clip_urls` only grows,
//! successive projections of the same job never decrease.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};
use crate::stage::Stage;

/// Fixed percentage weight of each stage in overall progress.
pub fn stage_weight(stage: Stage) -> u8 {
    match stage {
        Stage::Planning => 10,
        Stage::ClipGeneration => 60,
        Stage::MusicGeneration => 10,
        Stage::DisclaimerPlanning => 4,
        Stage::NarrationSynthesis => 6,
        Stage::Composition => 10,
        Stage::Complete => 0,
    }
}

/// Static per-stage duration floors used for ETA when no history exists.
pub fn stage_floor_secs(stage: Stage, scene_count: usize) -> u64 {
    match stage {
        Stage::Planning => 20,
        Stage::ClipGeneration => 60 * scene_count.max(1) as u64,
        Stage::MusicGeneration => 45,
        Stage::DisclaimerPlanning => 10,
        Stage::NarrationSynthesis => 15,
        Stage::Composition => 30,
        Stage::Complete => 0,
    }
}

/// Snapshot returned by `GetProgress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Progress {
    pub status: JobStatus,
    /// 0-100, monotone across successive reads
    pub progress: u8,
    /// Human label of the current stage
    pub current_stage: String,
    pub stages_completed: Vec<String>,
    pub stages_pending: Vec<String>,
    pub estimated_time_remaining_secs: u64,
}

/// Project the client-visible progress of a job.
///
/// `eta_secs` lets the caller substitute an estimate from observed stage
/// timings; when `None` the static floors are summed over pending stages.
pub fn project_progress(job: &Job, eta_secs: Option<u64>) -> Progress {
    let percent = compute_percent(job);
    let (completed, pending) = stage_lists(job);

    let eta = if job.status.is_terminal() {
        0
    } else {
        eta_secs.unwrap_or_else(|| default_eta_secs(job))
    };

    Progress {
        status: job.status,
        progress: percent,
        current_stage: match job.status {
            JobStatus::Completed => Stage::Complete.label().to_string(),
            _ => job.stage.label().to_string(),
        },
        stages_completed: completed,
        stages_pending: pending,
        estimated_time_remaining_secs: eta,
    }
}

fn compute_percent(job: &Job) -> u8 {
    if job.status == JobStatus::Completed {
        return 100;
    }

    let current = job.stage.index();
    let mut percent: u32 = Stage::ORDER
        .iter()
        .filter(|s| s.index() < current)
        .map(|s| stage_weight(*s) as u32)
        .sum();

    // Within-stage interpolation for the long clip stage
    if job.stage == Stage::ClipGeneration {
        let planned = job.planned_scene_count();
        if planned > 0 {
            let done = job.clip_urls.len().min(planned) as u32;
            percent += stage_weight(Stage::ClipGeneration) as u32 * done / planned as u32;
        }
    }

    percent.min(99) as u8
}

fn stage_lists(job: &Job) -> (Vec<String>, Vec<String>) {
    let current = job.stage.index();
    let mut completed = Vec::new();
    let mut pending = Vec::new();

    for stage in Stage::ORDER {
        if *stage == Stage::Complete {
            continue;
        }
        // Skipped stages never appear in either list
        if !job.stage_applies(*stage) && job.script.is_some() {
            continue;
        }
        if stage.index() < current || job.status == JobStatus::Completed {
            completed.push(stage.as_str().to_string());
        } else if stage.index() > current {
            pending.push(stage.as_str().to_string());
        }
    }

    (completed, pending)
}

/// ETA from static floors when no timing history is available.
pub fn default_eta_secs(job: &Job) -> u64 {
    let scene_count = job.planned_scene_count();
    let current = job.stage.index();

    Stage::ORDER
        .iter()
        .filter(|s| s.index() >= current && **s != Stage::Complete)
        .filter(|s| job.stage_applies(**s) || job.script.is_none())
        .map(|s| {
            if *s == Stage::ClipGeneration && job.stage == Stage::ClipGeneration {
                let remaining = scene_count.saturating_sub(job.clip_urls.len());
                60 * remaining.max(1) as u64
            } else {
                stage_floor_secs(*s, scene_count)
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AdRequest, AspectRatio};
    use crate::script::tests::script_with_durations;

    fn job() -> Job {
        let request = AdRequest {
            prompt: "30-second cinematic ad for an eco-friendly water bottle".to_string(),
            duration_secs: 30,
            aspect_ratio: AspectRatio::Landscape,
            start_image_url: None,
            style_reference_url: None,
            disclaimer_text: None,
            idempotency_key: None,
        };
        Job::new("user-1", request, "k".to_string())
    }

    #[test]
    fn test_weights_sum_to_100() {
        let total: u32 = Stage::ORDER.iter().map(|s| stage_weight(*s) as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_planning_reports_zero() {
        let progress = project_progress(&job(), None);
        assert_eq!(progress.progress, 0);
        assert_eq!(progress.current_stage, "Planning script");
        assert!(progress.stages_completed.is_empty());
    }

    #[test]
    fn test_clip_interpolation() {
        let mut j = job();
        j.script = Some(script_with_durations(&[8, 8, 8, 8]));
        j.stage = Stage::ClipGeneration;

        let p0 = project_progress(&j, None).progress;
        j.clip_urls.push("clip-1".to_string());
        let p1 = project_progress(&j, None).progress;
        j.clip_urls.push("clip-2".to_string());
        let p2 = project_progress(&j, None).progress;

        assert_eq!(p0, 10);
        assert_eq!(p1, 25);
        assert_eq!(p2, 40);
    }

    #[test]
    fn test_progress_monotone_over_stage_walk() {
        let mut j = job();
        j.script = Some(script_with_durations(&[8, 8, 8, 8]));
        let mut last = project_progress(&j, None).progress;

        j.stage = Stage::ClipGeneration;
        for n in 1..=4 {
            j.clip_urls.push(format!("clip-{n}"));
            let p = project_progress(&j, None).progress;
            assert!(p >= last);
            last = p;
        }
        for stage in [
            Stage::MusicGeneration,
            Stage::DisclaimerPlanning,
            Stage::NarrationSynthesis,
            Stage::Composition,
        ] {
            j.stage = stage;
            let p = project_progress(&j, None).progress;
            assert!(p >= last);
            last = p;
        }
        j.complete("final.mp4");
        assert!(project_progress(&j, None).progress >= last);
    }

    #[test]
    fn test_completed_reports_100() {
        let mut j = job();
        j.script = Some(script_with_durations(&[8, 8, 8, 8]));
        j.complete("final.mp4");
        let progress = project_progress(&j, None);
        assert_eq!(progress.progress, 100);
        assert!(progress.stages_pending.is_empty());
        assert_eq!(progress.estimated_time_remaining_secs, 0);
    }

    #[test]
    fn test_skipped_stages_hidden_once_planned() {
        let mut j = job();
        j.script = Some(script_with_durations(&[8, 8, 8, 8]));
        j.stage = Stage::ClipGeneration;
        let progress = project_progress(&j, None);
        // no disclaimer text -> pharma stages are not listed
        assert!(!progress
            .stages_pending
            .iter()
            .any(|s| s == "disclaimer_planning" || s == "narration_synthesis"));
        assert!(progress.stages_pending.iter().any(|s| s == "composition"));
    }

    #[test]
    fn test_eta_shrinks_with_completed_clips() {
        let mut j = job();
        j.script = Some(script_with_durations(&[8, 8, 8, 8]));
        j.stage = Stage::ClipGeneration;
        let eta0 = default_eta_secs(&j);
        j.clip_urls.push("clip-1".to_string());
        let eta1 = default_eta_secs(&j);
        assert!(eta1 < eta0);
    }
}
