//! ETA estimation from observed stage timings.
//!
//! An in-process moving window of per-stage durations. Where no history
//! exists yet the caller falls back to the static floors in the progress
//! projector. Clip generation is observed per scene, since its cost
//! scales with the scene count, not the stage.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use spotgen_models::{stage_floor_secs, Job, Stage};

/// Observations kept per stage.
const WINDOW: usize = 20;

/// Moving-window stage timing tracker.
#[derive(Default)]
pub struct EtaEstimator {
    samples: Mutex<HashMap<Stage, VecDeque<f64>>>,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed duration. For `ClipGeneration` pass the
    /// per-scene duration.
    pub fn observe(&self, stage: Stage, secs: f64) {
        if secs <= 0.0 {
            return;
        }
        let mut samples = self.samples.lock().expect("eta lock poisoned");
        let window = samples.entry(stage).or_default();
        if window.len() == WINDOW {
            window.pop_front();
        }
        window.push_back(secs);
    }

    /// Moving average for a stage, if any history exists.
    pub fn average(&self, stage: Stage) -> Option<f64> {
        let samples = self.samples.lock().expect("eta lock poisoned");
        let window = samples.get(&stage)?;
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Estimate seconds remaining for a job, mixing observed averages
    /// with static floors for stages without history.
    pub fn estimate(&self, job: &Job) -> u64 {
        let scene_count = job.planned_scene_count();
        let current = job.stage.index();

        Stage::ORDER
            .iter()
            .filter(|s| s.index() >= current && **s != Stage::Complete)
            .filter(|s| job.stage_applies(**s) || job.script.is_none())
            .map(|s| match s {
                Stage::ClipGeneration => {
                    let remaining = if job.stage == Stage::ClipGeneration {
                        scene_count.saturating_sub(job.clip_urls.len()).max(1)
                    } else {
                        scene_count.max(1)
                    };
                    let per_scene = self
                        .average(Stage::ClipGeneration)
                        .unwrap_or_else(|| {
                            stage_floor_secs(Stage::ClipGeneration, 1) as f64
                        });
                    (per_scene * remaining as f64) as u64
                }
                stage => self
                    .average(*stage)
                    .map(|avg| avg as u64)
                    .unwrap_or_else(|| stage_floor_secs(*stage, scene_count)),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgen_models::{AdRequest, AspectRatio};

    fn job() -> Job {
        Job::new(
            "user-1",
            AdRequest {
                prompt: "30-second cinematic ad for an eco-friendly water bottle".to_string(),
                duration_secs: 30,
                aspect_ratio: AspectRatio::Landscape,
                start_image_url: None,
                style_reference_url: None,
                disclaimer_text: None,
                idempotency_key: None,
            },
            "k".to_string(),
        )
    }

    #[test]
    fn test_window_caps_samples() {
        let eta = EtaEstimator::new();
        for i in 0..50 {
            eta.observe(Stage::Planning, i as f64);
        }
        // Only the most recent WINDOW samples survive: 30..=49
        let avg = eta.average(Stage::Planning).unwrap();
        assert!((avg - 39.5).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_uses_observations_over_floors() {
        let eta = EtaEstimator::new();
        let job = job();

        let cold = eta.estimate(&job);
        eta.observe(Stage::Planning, 5.0);
        let warm = eta.estimate(&job);
        // a 5s observed planning beats the 20s static floor
        assert!(warm < cold);
    }

    #[test]
    fn test_zero_observations_ignored() {
        let eta = EtaEstimator::new();
        eta.observe(Stage::Planning, 0.0);
        eta.observe(Stage::Planning, -3.0);
        assert!(eta.average(Stage::Planning).is_none());
    }
}
