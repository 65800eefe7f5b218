//! Clip generation stage: one video clip per scene, frame-chained.
//!
//! Scenes run strictly in order because scene i's opening frame is the
//! final frame of clip i-1; this chain is the continuity guarantee and
//! the pipeline's intentional latency floor. Every finished scene is
//! persisted (clip key + cleared inflight handle) before the next scene
//! starts, so a restarted worker resumes at the first missing clip, and a
//! persisted prediction handle means a restart resumes polling instead of
//! paying for a fresh generation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use spotgen_adapters::AdapterError;
use spotgen_media::{extract_last_frame, Workdir};
use spotgen_models::{InflightPrediction, Scene, Stage};
use spotgen_storage::layout;

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::orchestrator::TrackedJob;
use crate::retry::{run_with_retries, HEAVY_STAGE_ATTEMPTS};

/// Lifetime of the presigned frame URL handed to the video model.
const FRAME_URL_TTL: Duration = Duration::from_secs(3600);

pub async fn run(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    let script = tracked
        .job
        .script
        .clone()
        .ok_or_else(|| WorkerError::internal("clip stage entered without a script"))?;

    let workdir = Workdir::create(
        Some(Path::new(&ctx.config.work_dir)),
        &format!("job-{}-", tracked.job.job_id),
    )?;

    let mut prev_clip_path: Option<PathBuf> = None;

    for (index, scene) in script.scenes.iter().enumerate() {
        // Clips already persisted are done; this is the restart resume point
        if index < tracked.job.clip_urls.len() {
            continue;
        }
        if *cancel_rx.borrow() {
            return Err(WorkerError::Cancelled);
        }

        let logger = JobLogger::new(&tracked.job.job_id, Stage::ClipGeneration);
        logger.progress(&format!(
            "Generating scene {}/{}",
            scene.scene_number,
            script.scenes.len()
        ));

        let start_image_url =
            resolve_start_image(ctx, tracked, &workdir, index, prev_clip_path.as_deref()).await?;

        let clip_bytes = generate_scene(ctx, tracked, scene, start_image_url.as_deref(), cancel_rx).await?;

        // Keep a local copy for the next scene's frame extraction
        let clip_path = workdir.file(&format!("clip-{:03}.mp4", scene.scene_number));
        tokio::fs::write(&clip_path, &clip_bytes).await?;

        let key = layout::clip_key(
            &tracked.job.user_id,
            tracked.job.job_id.as_str(),
            scene.scene_number,
            &clip_bytes,
        );
        run_with_retries("clip_upload", 3, || {
            let bytes = clip_bytes.clone();
            let key = key.clone();
            async move {
                ctx.storage
                    .upload_bytes(bytes, &key, "video/mp4")
                    .await
                    .map_err(WorkerError::from)
            }
        })
        .await?;

        tracked.job.clip_urls.push(key);
        tracked.job.inflight = None;
        tracked.save(&ctx.jobs).await?;

        prev_clip_path = Some(clip_path);
    }

    Ok(())
}

/// Resolve the opening frame for scene `index`.
///
/// Scene 0 uses the submission's start image if any. Later scenes chain
/// from the previous clip's final frame, uploaded and presigned so the
/// external model can fetch it.
async fn resolve_start_image(
    ctx: &ProcessingContext,
    tracked: &TrackedJob,
    workdir: &Workdir,
    index: usize,
    prev_clip_path: Option<&Path>,
) -> WorkerResult<Option<String>> {
    if index == 0 {
        return Ok(tracked.job.request.start_image_url.clone());
    }

    let prev_path = match prev_clip_path {
        Some(p) => p.to_path_buf(),
        None => {
            // Resumed mid-stage: the previous clip exists only in storage
            let key = &tracked.job.clip_urls[index - 1];
            let path = workdir.file(&format!("clip-{:03}.mp4", index));
            run_with_retries("clip_fetch", 3, || {
                let path = path.clone();
                async move {
                    ctx.storage
                        .download_file(key, &path)
                        .await
                        .map_err(WorkerError::from)
                }
            })
            .await?;
            path
        }
    };

    let frame_path = workdir.file(&format!("frame-{:03}.png", index));
    extract_last_frame(&prev_path, &frame_path).await?;
    let frame_bytes = tokio::fs::read(&frame_path).await?;

    let scene_number = (index as u32) + 1;
    let key = layout::frame_key(
        &tracked.job.user_id,
        tracked.job.job_id.as_str(),
        scene_number,
        &frame_bytes,
    );
    ctx.storage
        .upload_bytes(frame_bytes, &key, "image/png")
        .await?;

    let url = ctx.storage.presign_get(&key, FRAME_URL_TTL).await?;
    Ok(Some(url))
}

/// Produce one scene's clip bytes, with a single identical-input retry.
///
/// A prediction handle persisted from a previous worker life is polled
/// first instead of submitting (and billing) again.
async fn generate_scene(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    scene: &Scene,
    start_image_url: Option<&str>,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<Vec<u8>> {
    let mut resumed = tracked
        .job
        .inflight
        .clone()
        .filter(|p| p.stage == Stage::ClipGeneration && p.scene_number == Some(scene.scene_number));

    let mut last_failure = String::new();

    for attempt in 0..HEAVY_STAGE_ATTEMPTS {
        if *cancel_rx.borrow() {
            return Err(WorkerError::Cancelled);
        }

        let prediction_id = match resumed.take() {
            Some(inflight) => inflight.prediction_id,
            None => {
                let prediction = run_with_retries("clip_submit", 3, || async {
                    ctx.video
                        .submit_scene(
                            &scene.generation_prompt,
                            scene.duration_secs,
                            tracked.job.request.aspect_ratio,
                            start_image_url,
                        )
                        .await
                        .map_err(WorkerError::from)
                })
                .await?;

                // Persist the handle before the first poll so a restart
                // resumes polling rather than re-submitting
                tracked.job.inflight = Some(InflightPrediction {
                    stage: Stage::ClipGeneration,
                    scene_number: Some(scene.scene_number),
                    prediction_id: prediction.id.clone(),
                });
                tracked.save(&ctx.jobs).await?;
                prediction.id
            }
        };

        match ctx
            .video
            .client()
            .await_prediction(&prediction_id, ctx.config.scene_deadline, cancel_rx)
            .await
        {
            Ok(prediction) => {
                let url = prediction.output_url.ok_or_else(|| {
                    WorkerError::scene_failed(
                        scene.scene_number,
                        "prediction succeeded without an output URL",
                    )
                })?;
                if *cancel_rx.borrow() {
                    return Err(WorkerError::Cancelled);
                }
                return run_with_retries("clip_download", 3, || async {
                    ctx.video
                        .client()
                        .download(&url)
                        .await
                        .map_err(WorkerError::from)
                })
                .await;
            }
            Err(AdapterError::Cancelled) => return Err(WorkerError::Cancelled),
            Err(e @ AdapterError::BadRequest(_)) | Err(e @ AdapterError::Auth(_)) => {
                return Err(e.into())
            }
            Err(e) => {
                // Remote failure or per-scene deadline: retry once with
                // identical inputs, abandoning the old prediction
                last_failure = e.to_string();
                warn!(
                    scene = scene.scene_number,
                    attempt = attempt + 1,
                    "Scene generation attempt failed: {}",
                    e
                );
                tracked.job.inflight = None;
                tracked.save(&ctx.jobs).await?;
            }
        }
    }

    Err(WorkerError::scene_failed(
        scene.scene_number,
        format!("failed after {HEAVY_STAGE_ATTEMPTS} attempts: {last_failure}"),
    ))
}
