//! Narration synthesis stage (pharmaceutical mode only).
//!
//! Synthesizes the disclaimer audio first and measures its real duration
//! with ffprobe; the narration word budget and the compositor's timeline
//! both derive from that measurement, never from an estimate. TTS
//! failures are fatal here: the spoken disclosure is a regulatory
//! requirement.

use std::path::Path;

use tokio::sync::watch;

use spotgen_adapters::AdapterError;
use spotgen_media::{get_duration, Workdir};
use spotgen_models::{
    narration_budget_secs, narration_budget_words, InflightPrediction, Stage,
    DISCLAIMER_PLAYBACK_SPEED,
};
use spotgen_storage::layout;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::orchestrator::TrackedJob;
use crate::retry::run_with_retries;

pub async fn run(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    let mut spec = tracked
        .job
        .disclaimer_spec
        .clone()
        .ok_or_else(|| WorkerError::internal("narration stage entered without disclaimer spec"))?;

    let logger = JobLogger::new(&tracked.job.job_id, Stage::NarrationSynthesis);
    let workdir = Workdir::create(
        Some(Path::new(&ctx.config.work_dir)),
        &format!("job-{}-tts-", tracked.job.job_id),
    )?;
    let duration = tracked.job.request.duration_secs;

    // 1. Disclaimer audio, measured
    if spec.tier.has_audio() && tracked.job.disclaimer_audio_url.is_none() {
        logger.progress("Synthesizing disclaimer audio");
        let bytes = synthesize(
            ctx,
            tracked,
            cancel_rx,
            &spec.spoken_text,
            DISCLAIMER_PLAYBACK_SPEED,
        )
        .await?;

        let path = workdir.file("disclaimer.mp3");
        tokio::fs::write(&path, &bytes).await?;
        let measured = get_duration(&path).await?;

        let key = layout::disclaimer_key(&tracked.job.user_id, tracked.job.job_id.as_str(), &bytes);
        ctx.storage.upload_bytes(bytes, &key, "audio/mpeg").await?;

        spec.audio_duration_secs = measured;
        tracked.job.disclaimer_audio_url = Some(key);
        tracked.job.disclaimer_spec = Some(spec.clone());
        tracked.job.inflight = None;
        tracked.save(&ctx.jobs).await?;
    }

    // 2. Main narration, trimmed to the remaining budget
    let narrator_script = tracked.job.script.as_ref().and_then(|s| {
        s.audio_spec
            .narrator_script
            .clone()
            .or_else(|| s.audio_spec.voiceover_script.clone())
    });

    if let Some(script_text) = narrator_script {
        if tracked.job.narration_url.is_none() {
            let budget_secs = narration_budget_secs(duration, spec.audio_duration_secs);
            let budget_words = narration_budget_words(budget_secs);

            if budget_words == 0 {
                logger.warning("No narration budget left after the disclaimer; skipping voiceover");
            } else {
                let text = trim_to_words(&script_text, budget_words as usize);
                logger.progress(&format!(
                    "Synthesizing narration ({budget_words} word budget)"
                ));
                let bytes = synthesize(ctx, tracked, cancel_rx, &text, 1.0).await?;

                let key =
                    layout::narration_key(&tracked.job.user_id, tracked.job.job_id.as_str(), &bytes);
                ctx.storage.upload_bytes(bytes, &key, "audio/mpeg").await?;

                tracked.job.narration_url = Some(key);
                tracked.job.inflight = None;
                tracked.save(&ctx.jobs).await?;
            }
        }
    }

    Ok(())
}

/// One TTS round trip with inflight-handle persistence.
async fn synthesize(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    cancel_rx: &watch::Receiver<bool>,
    text: &str,
    speed: f64,
) -> WorkerResult<Vec<u8>> {
    if *cancel_rx.borrow() {
        return Err(WorkerError::Cancelled);
    }

    let prediction_id = match tracked
        .job
        .inflight
        .clone()
        .filter(|p| p.stage == Stage::NarrationSynthesis)
    {
        Some(inflight) => inflight.prediction_id,
        None => {
            let prediction = run_with_retries("tts_submit", 3, || async {
                ctx.tts
                    .submit_speech(text, spotgen_adapters::DEFAULT_VOICE, speed)
                    .await
                    .map_err(WorkerError::from)
            })
            .await?;

            tracked.job.inflight = Some(InflightPrediction {
                stage: Stage::NarrationSynthesis,
                scene_number: None,
                prediction_id: prediction.id.clone(),
            });
            tracked.save(&ctx.jobs).await?;
            prediction.id
        }
    };

    let prediction = ctx
        .tts
        .client()
        .await_prediction(&prediction_id, ctx.config.tts_deadline, cancel_rx)
        .await
        .map_err(|e| match e {
            AdapterError::Cancelled => WorkerError::Cancelled,
            other => WorkerError::from(other),
        })?;

    let url = prediction
        .output_url
        .ok_or_else(|| WorkerError::internal("TTS prediction succeeded without output"))?;

    if *cancel_rx.borrow() {
        return Err(WorkerError::Cancelled);
    }
    run_with_retries("tts_download", 3, || async {
        ctx.tts.client().download(&url).await.map_err(WorkerError::from)
    })
    .await
}

fn trim_to_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.trim().to_string()
    } else {
        words[..max_words].join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_to_words_preserves_short_text() {
        assert_eq!(trim_to_words("stay hydrated", 10), "stay hydrated");
    }

    #[test]
    fn test_trim_to_words_cuts_long_text() {
        let text = "a b c d e f g h";
        assert_eq!(trim_to_words(text, 3), "a b c");
    }
}
