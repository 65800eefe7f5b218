//! Composition stage: deterministic final assembly.

use std::path::Path;

use tokio::sync::watch;
use tracing::warn;

use spotgen_media::{compose, ComposeInputs, DisclaimerTrack, Workdir};
use spotgen_models::Stage;
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
    let logger = JobLogger::new(&tracked.job.job_id, Stage::Composition);
    let job = &tracked.job;

    if job.clip_urls.is_empty() {
        return Err(WorkerError::internal("composition entered without clips"));
    }
    let planned = job.planned_scene_count();
    if job.clip_urls.len() != planned {
        return Err(WorkerError::internal(format!(
            "composition entered with {}/{planned} clips",
            job.clip_urls.len()
        )));
    }

    let workdir = Workdir::create(
        Some(Path::new(&ctx.config.work_dir)),
        &format!("job-{}-compose-", job.job_id),
    )?;

    // Gather every artifact locally
    logger.progress(&format!("Fetching {} clips", job.clip_urls.len()));
    let mut clip_paths = Vec::with_capacity(job.clip_urls.len());
    for (i, key) in job.clip_urls.iter().enumerate() {
        if *cancel_rx.borrow() {
            return Err(WorkerError::Cancelled);
        }
        let path = workdir.file(&format!("clip-{:03}.mp4", i + 1));
        fetch(ctx, key, &path).await?;
        clip_paths.push(path);
    }

    let music_path = match &job.music_url {
        Some(key) => {
            let path = workdir.file("music.mp3");
            fetch(ctx, key, &path).await?;
            Some(path)
        }
        None => None,
    };

    let narration_path = match &job.narration_url {
        Some(key) => {
            let path = workdir.file("narration.mp3");
            fetch(ctx, key, &path).await?;
            Some(path)
        }
        None => None,
    };

    let disclaimer = match (&job.disclaimer_spec, &job.disclaimer_audio_url) {
        (Some(spec), Some(key)) if spec.tier.has_audio() => {
            let path = workdir.file("disclaimer.mp3");
            fetch(ctx, key, &path).await?;
            Some(DisclaimerTrack {
                path,
                start_secs: spec.audio_start_secs(job.request.duration_secs),
            })
        }
        _ => None,
    };

    let inputs = ComposeInputs {
        clip_paths,
        duration_secs: job.request.duration_secs,
        music_path,
        narration_path,
        disclaimer,
    };

    logger.progress("Composing final video");
    let output = workdir.file("final.mp4");
    compose(
        workdir.path(),
        &inputs,
        &output,
        Some(cancel_rx.clone()),
        ctx.config.compose_deadline.as_secs(),
    )
    .await?;

    let bytes = tokio::fs::read(&output).await?;
    let key = layout::final_video_key(&tracked.job.user_id, tracked.job.job_id.as_str(), &bytes);
    run_with_retries("final_upload", 3, || {
        let bytes = bytes.clone();
        let key = key.clone();
        async move {
            ctx.storage
                .upload_bytes(bytes, &key, "video/mp4")
                .await
                .map_err(WorkerError::from)
        }
    })
    .await?;

    tracked.job.complete(key);
    tracked.save(&ctx.jobs).await?;

    // Period bookkeeping is best-effort; the job itself is already done
    if let Err(e) = ctx
        .usage
        .record_completion(&tracked.job.user_id, tracked.job.request.duration_secs)
        .await
    {
        warn!(job_id = %tracked.job.job_id, "Usage bookkeeping failed: {}", e);
    }

    Ok(())
}

async fn fetch(ctx: &ProcessingContext, key: &str, path: &Path) -> WorkerResult<()> {
    run_with_retries("artifact_fetch", 3, || async move {
        ctx.storage
            .download_file(key, path)
            .await
            .map_err(WorkerError::from)
    })
    .await
}
