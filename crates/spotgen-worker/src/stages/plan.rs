//! Planning stage: turn the brief into a validated script.

use tracing::{debug, warn};

use spotgen_adapters::extract_and_parse;
use spotgen_models::{scene_count_range, AdRequest, Job, Scene, Script};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};

/// Sampling temperature for script planning.
const PLANNER_TEMPERATURE: f64 = 0.8;

/// Expert-director system prompt. The concrete wording is a tuned asset;
/// the pipeline only relies on the response schema.
const DIRECTOR_TEMPLATE: &str = r#"You are an award-winning commercial director planning a video advertisement.
Break the brief into scenes for an AI video generator. Respect these hard rules:
- scene durations must be exactly 4, 6, or 8 seconds
- scene_number starts at 1 and is contiguous
- each generation_prompt is a self-contained visual description under 300 characters
- define visual_constants (subject archetype, brand palette, lighting arc) and keep every scene consistent with them
- plan background music (mood + style) and, when a voiceover serves the brief, a narrator script
Return ONLY a single JSON object with this schema:
{
  "title": "...",
  "total_duration_secs": 0,
  "scenes": [
    {
      "scene_number": 1,
      "start_time_secs": 0.0,
      "duration_secs": 8,
      "shot": {
        "shot_type": "wide|medium|close_up|extreme_close_up|over_the_shoulder|pov|two_shot",
        "camera_angle": "eye_level|low_angle|high_angle|overhead|dutch_angle",
        "camera_move": "static|pan|tilt|dolly_in|dolly_out|tracking|crane|handheld",
        "lighting": "natural_daylight|golden_hour|blue_hour|studio|high_key|low_key|neon|candlelight",
        "color_grade": "warm|cool|neutral|high_contrast|pastel|monochrome|teal_orange",
        "mood": "uplifting|calm|energetic|dramatic|sincere|playful|luxurious|reassuring",
        "visual_style": "cinematic|documentary|commercial|lifestyle|editorial|macro"
      },
      "generation_prompt": "..."
    }
  ],
  "audio_spec": {
    "music_mood": "...",
    "music_style": "...",
    "narrator_script": "...",
    "sync_points": []
  },
  "visual_constants": {
    "subject_archetype": "...",
    "brand_palette": "...",
    "lighting_arc": "..."
  }
}"#;

/// Supplement appended in pharmaceutical mode.
const PHARMA_SUPPLEMENT: &str = r#"
This is a regulated pharmaceutical advertisement. Additional rules:
- depict the patient archetype with dignity; no exaggerated outcomes
- leave the final seconds visually calm for the spoken safety disclaimer
- the narrator script must avoid efficacy claims beyond the brief's wording"#;

/// Terms that switch the pharma supplement on even without explicit
/// disclaimer text.
const PHARMA_KEYWORDS: &[&str] = &[
    "side effects",
    "prescription",
    "pharmaceutical",
    "dosage",
    "fda",
    "contraindication",
    "ask your doctor",
];

/// Run the planning stage: one LLM call, JSON extraction, validation,
/// scene-count reconciliation. A malformed response is retried once with
/// the same inputs before surfacing as permanent.
pub async fn run(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Script> {
    let mut last_err = None;

    for attempt in 0..2 {
        match plan_once(ctx, job).await {
            Ok(script) => return Ok(script),
            Err(e) if is_malformed(&e) && attempt == 0 => {
                warn!(job_id = %job.job_id, "Planner returned malformed script, retrying once: {}", e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.expect("retry loop exited without error"))
}

fn is_malformed(e: &WorkerError) -> bool {
    matches!(
        e,
        WorkerError::Script(_)
            | WorkerError::Adapter(spotgen_adapters::AdapterError::Malformed(_))
    )
}

async fn plan_once(ctx: &ProcessingContext, job: &Job) -> WorkerResult<Script> {
    let system_prompt = build_system_prompt(&job.request);
    let user_prompt = build_user_prompt(&job.request);

    let raw = ctx
        .planner
        .generate_json(&system_prompt, &user_prompt, PLANNER_TEMPERATURE)
        .await?;

    let mut script: Script = extract_and_parse(&raw)?;
    debug!(job_id = %job.job_id, scenes = script.scenes.len(), "Planner produced script");

    reconcile_scene_count(&mut script, job.request.duration_secs);
    script.renumber();
    script.total_duration_secs = script.planned_duration_secs();

    // Pharma mode carries the verbatim disclaimer into the audio plan
    if let Some(text) = &job.request.disclaimer_text {
        script.audio_spec.disclaimer_text = Some(text.clone());
    }

    script.validate(job.request.duration_secs)?;
    Ok(script)
}

/// Static template + pharma supplement when the brief calls for it.
fn build_system_prompt(request: &AdRequest) -> String {
    let mut prompt = DIRECTOR_TEMPLATE.to_string();
    if pharma_detected(request) {
        prompt.push_str(PHARMA_SUPPLEMENT);
    }
    prompt
}

fn build_user_prompt(request: &AdRequest) -> String {
    let mut prompt = format!(
        "Brief: {}\nTarget duration: {} seconds\nAspect ratio: {}",
        request.prompt, request.duration_secs, request.aspect_ratio
    );
    if request.start_image_url.is_some() {
        prompt.push_str("\nThe first scene must flow from a provided opening image.");
    }
    if let Some(style_ref) = &request.style_reference_url {
        prompt.push_str(&format!("\nStyle reference image: {style_ref}"));
    }
    let (min, max) = scene_count_range(request.duration_secs);
    prompt.push_str(&format!("\nPlan {min}-{max} scenes."));
    prompt
}

/// Pharma mode by explicit disclaimer text or heuristic keyword match.
fn pharma_detected(request: &AdRequest) -> bool {
    if request.pharma_mode() {
        return true;
    }
    let prompt = request.prompt.to_lowercase();
    PHARMA_KEYWORDS.iter().any(|k| prompt.contains(k))
}

/// Pull an off-by-one scene count back into the target band.
///
/// One scene too many: merge the two shortest-possible trailing scenes
/// when the timeline allows dropping one, otherwise fold the last prompt
/// into its predecessor. One too few: duplicate the last scene. A larger
/// mismatch is left for validation to reject.
fn reconcile_scene_count(script: &mut Script, requested_duration: u32) {
    let (min, max) = scene_count_range(requested_duration);
    let count = script.scenes.len();

    if count == max + 1 {
        let last = script.scenes.pop().expect("non-empty scene list");
        let remaining: u32 = script.scenes.iter().map(|s| s.duration_secs).sum();
        if remaining < requested_duration {
            // Cannot just drop it; fold its content into the new last scene
            if let Some(tail) = script.scenes.last_mut() {
                tail.duration_secs = 8;
                tail.generation_prompt = merge_prompts(&tail.generation_prompt, &last.generation_prompt);
            }
        }
    } else if count + 1 == min {
        if let Some(last) = script.scenes.last().cloned() {
            script.scenes.push(Scene {
                scene_number: last.scene_number + 1,
                ..last
            });
        }
    }
}

fn merge_prompts(a: &str, b: &str) -> String {
    let merged = format!("{a}, then {b}");
    if merged.chars().count() > spotgen_models::MAX_GENERATION_PROMPT_CHARS {
        a.to_string()
    } else {
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgen_models::{
        AspectRatio, AudioSpec, CameraAngle, CameraMove, ColorGrade, Lighting, Mood,
        ShotDescriptors, ShotType, VisualConstants, VisualStyle,
    };

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

    fn script_with_durations(durations: &[u32]) -> Script {
        let scenes = durations
            .iter()
            .enumerate()
            .map(|(i, d)| Scene {
                scene_number: (i as u32) + 1,
                start_time_secs: 0.0,
                duration_secs: *d,
                shot: ShotDescriptors {
                    shot_type: ShotType::Medium,
                    camera_angle: CameraAngle::EyeLevel,
                    camera_move: CameraMove::Static,
                    lighting: Lighting::Studio,
                    color_grade: ColorGrade::Neutral,
                    mood: Mood::Uplifting,
                    visual_style: VisualStyle::Commercial,
                },
                generation_prompt: format!("scene {}", i + 1),
                start_image_url: None,
            })
            .collect();
        let mut script = Script {
            title: "t".to_string(),
            total_duration_secs: durations.iter().sum(),
            scenes,
            audio_spec: AudioSpec {
                music_mood: "uplifting".to_string(),
                music_style: "indie".to_string(),
                voiceover_script: None,
                narrator_script: None,
                disclaimer_text: None,
                disclaimer_start_offset_secs: None,
                sync_points: vec![],
            },
            visual_constants: VisualConstants {
                subject_archetype: "a".to_string(),
                brand_palette: "b".to_string(),
                lighting_arc: "c".to_string(),
            },
        };
        script.renumber();
        script
    }

    #[test]
    fn test_pharma_detection() {
        let mut req = request(30);
        assert!(!pharma_detected(&req));

        req.prompt = "ad for Zelvia, mention possible side effects apply".to_string();
        assert!(pharma_detected(&req));

        let mut req2 = request(30);
        req2.disclaimer_text = Some("May cause drowsiness.".to_string());
        assert!(pharma_detected(&req2));
    }

    #[test]
    fn test_system_prompt_gets_supplement() {
        let mut req = request(30);
        assert!(!build_system_prompt(&req).contains("regulated pharmaceutical"));
        req.disclaimer_text = Some("May cause drowsiness.".to_string());
        assert!(build_system_prompt(&req).contains("regulated pharmaceutical"));
    }

    #[test]
    fn test_user_prompt_carries_scene_band() {
        let prompt = build_user_prompt(&request(30));
        assert!(prompt.contains("Plan 4-5 scenes."));
        assert!(prompt.contains("30 seconds"));
    }

    #[test]
    fn test_reconcile_one_too_many_drops_when_duration_allows() {
        // 6 scenes x 8s for a 30s request: one over the max of 5, and
        // dropping one keeps 40s >= 30s
        let mut script = script_with_durations(&[8, 8, 8, 8, 8, 8]);
        reconcile_scene_count(&mut script, 30);
        script.renumber();
        assert_eq!(script.scenes.len(), 5);
        assert!(script.validate(30).is_ok());
    }

    #[test]
    fn test_reconcile_one_too_many_merges_when_duration_is_tight() {
        // 6 scenes summing to 32: dropping the tail would land below the
        // requested duration, so the prompt is folded and the new last
        // scene stretched to the longest clip length
        let mut script = script_with_durations(&[6, 6, 6, 6, 4, 4]);
        reconcile_scene_count(&mut script, 30);
        script.renumber();
        assert_eq!(script.scenes.len(), 5);
        assert_eq!(script.scenes.last().unwrap().duration_secs, 8);
        assert!(script.scenes.last().unwrap().generation_prompt.contains("then"));
        assert!(script.validate(30).is_ok());
    }

    #[test]
    fn test_reconcile_one_too_few_duplicates_last() {
        let mut script = script_with_durations(&[8, 8, 8]);
        reconcile_scene_count(&mut script, 30);
        script.renumber();
        assert_eq!(script.scenes.len(), 4);
        assert_eq!(
            script.scenes[2].generation_prompt,
            script.scenes[3].generation_prompt
        );
        assert!(script.validate(30).is_ok());
    }

    #[test]
    fn test_reconcile_leaves_larger_mismatch_for_validation() {
        let mut script = script_with_durations(&[8, 8, 8, 8, 8, 8, 8]);
        reconcile_scene_count(&mut script, 30);
        script.renumber();
        // 7 scenes is min+2 over; validation must reject it
        assert!(script.validate(30).is_err());
    }
}
