//! Music generation stage.
//!
//! Failures here are non-fatal: a video without music ships, a video
//! without its clips does not. Anything short of cancellation logs,
//! leaves `music_url` unset, and lets the stage advance.

use tokio::sync::watch;
use tracing::warn;

use spotgen_adapters::{build_music_prompt, AdapterError};
use spotgen_models::{InflightPrediction, Stage};
use spotgen_storage::layout;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::orchestrator::TrackedJob;

pub async fn run(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    let logger = JobLogger::new(&tracked.job.job_id, Stage::MusicGeneration);

    match generate(ctx, tracked, cancel_rx).await {
        Ok(key) => {
            tracked.job.music_url = Some(key);
            Ok(())
        }
        Err(e) if is_fatal(&e) => Err(e),
        Err(e) => {
            logger.warning(&format!("Music generation failed, continuing without: {e}"));
            tracked.job.music_url = None;
            tracked.job.inflight = None;
            Ok(())
        }
    }
}

/// Cancellation and lost write races must still stop the job.
fn is_fatal(e: &WorkerError) -> bool {
    matches!(
        e,
        WorkerError::Cancelled
            | WorkerError::StaleWrite
            | WorkerError::Adapter(AdapterError::Cancelled)
    )
}

async fn generate(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<String> {
    let audio_spec = tracked
        .job
        .script
        .as_ref()
        .map(|s| s.audio_spec.clone())
        .ok_or_else(|| WorkerError::internal("music stage entered without a script"))?;

    if *cancel_rx.borrow() {
        return Err(WorkerError::Cancelled);
    }

    let prompt = build_music_prompt(
        &audio_spec.music_style,
        &audio_spec.music_mood,
        &tracked.job.request.prompt,
    );
    let duration = tracked.job.request.duration_secs;

    // Resume a handle from a previous worker life if one is persisted
    let prediction_id = match tracked
        .job
        .inflight
        .clone()
        .filter(|p| p.stage == Stage::MusicGeneration)
    {
        Some(inflight) => inflight.prediction_id,
        None => {
            let prediction = ctx.music.submit_music(&prompt, duration).await?;
            tracked.job.inflight = Some(InflightPrediction {
                stage: Stage::MusicGeneration,
                scene_number: None,
                prediction_id: prediction.id.clone(),
            });
            tracked.save(&ctx.jobs).await?;
            prediction.id
        }
    };

    let prediction = ctx
        .music
        .client()
        .await_prediction(&prediction_id, ctx.config.music_deadline, cancel_rx)
        .await?;

    let url = prediction
        .output_url
        .ok_or_else(|| WorkerError::internal("music prediction succeeded without output"))?;

    if *cancel_rx.borrow() {
        return Err(WorkerError::Cancelled);
    }
    let bytes = ctx.music.client().download(&url).await?;

    let key = layout::music_key(&tracked.job.user_id, tracked.job.job_id.as_str(), &bytes);
    ctx.storage
        .upload_bytes(bytes, &key, "audio/mpeg")
        .await
        .map_err(|e| {
            warn!("Music upload failed: {e}");
            WorkerError::from(e)
        })?;

    tracked.job.inflight = None;
    Ok(key)
}
