//! Stage machine driver.
//!
//! `drive` runs one job to a terminal state. Each pass of the loop reads
//! the job record fresh, observes cancellation, enters the current stage,
//! and merges the stage's artifacts back with a conditional write keyed on
//! the record's `updateTime`. A lost write race (`StaleWrite`) means
//! another actor advanced or cancelled the job; the pass's result is
//! dropped and the loop re-reads.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use spotgen_firestore::JobsRepository;
use spotgen_models::{Job, JobId, JobStatus, Stage};

use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::retry::{run_with_retries, LIGHT_STAGE_ATTEMPTS};
use crate::stages;

/// A job record paired with its optimistic-locking token.
pub struct TrackedJob {
    pub job: Job,
    token: Option<String>,
}

impl TrackedJob {
    pub fn new(job: Job, token: Option<String>) -> Self {
        Self { job, token }
    }

    /// Conditionally persist the record. A precondition failure surfaces
    /// as `StaleWrite`: the caller must drop its result and re-read.
    pub async fn save(&mut self, repo: &JobsRepository) -> WorkerResult<()> {
        self.job.updated_at = Utc::now();
        match repo.save_conditional(&self.job, self.token.as_deref()).await {
            Ok(token) => {
                self.token = token;
                Ok(())
            }
            Err(e) if e.is_precondition_failed() => Err(WorkerError::StaleWrite),
            Err(e) => Err(e.into()),
        }
    }
}

/// Run a job to a terminal state. Returns `Ok` when the job reached any
/// terminal status (including failed/cancelled); `Err` only for
/// infrastructure problems that warrant queue redelivery.
pub async fn drive(ctx: Arc<ProcessingContext>, job_id: &JobId) -> WorkerResult<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let watcher = spawn_cancel_watcher(Arc::clone(&ctx), job_id.clone(), cancel_tx);

    let result = drive_inner(&ctx, job_id, &cancel_rx).await;
    watcher.abort();
    result
}

async fn drive_inner(
    ctx: &ProcessingContext,
    job_id: &JobId,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    loop {
        let stored = ctx
            .jobs
            .load(job_id)
            .await?
            .ok_or_else(|| WorkerError::JobMissing(job_id.to_string()))?;
        let mut tracked = TrackedJob::new(stored.job, stored.update_time);

        if tracked.job.status.is_terminal() {
            return Ok(());
        }

        if tracked.job.cancel_requested {
            return finish_cancelled(ctx, tracked).await;
        }

        // Deadline runs from submission, so redeliveries do not reset it
        let age = Utc::now() - tracked.job.created_at;
        if age.to_std().unwrap_or_default() > ctx.config.job_deadline {
            let err = WorkerError::Timeout(format!(
                "job exceeded the {}s deadline",
                ctx.config.job_deadline.as_secs()
            ));
            return finish_failed(ctx, tracked, err).await;
        }

        let stage = tracked.job.stage;

        if stage == Stage::Complete {
            // Stage marker ran ahead of the status; reconcile.
            tracked.job.status = JobStatus::Completed;
            match tracked.save(&ctx.jobs).await {
                Ok(()) => return Ok(()),
                Err(WorkerError::StaleWrite) => continue,
                Err(e) => return Err(e),
            }
        }

        // Skippable stages advance their marker without running
        if !tracked.job.stage_applies(stage) {
            JobLogger::new(job_id, stage).progress("Stage not requested, skipping");
            tracked.job.stage = stage.next().expect("non-terminal stage has a successor");
            match tracked.save(&ctx.jobs).await {
                Ok(()) => continue,
                Err(WorkerError::StaleWrite) => continue,
                Err(e) => return Err(e),
            }
        }

        // Persist stage entry so pollers see the current position
        if let Err(e) = tracked.save(&ctx.jobs).await {
            match e {
                WorkerError::StaleWrite => continue,
                other => return Err(other),
            }
        }

        let logger = JobLogger::new(job_id, stage);
        logger.progress("Stage started");

        match run_stage(ctx, &mut tracked, stage, cancel_rx).await {
            Ok(()) => {
                if tracked.job.status == JobStatus::Completed {
                    info!(job_id = %job_id, "Job completed");
                    return Ok(());
                }
                tracked.job.stage = stage.next().expect("non-terminal stage has a successor");
                tracked.job.inflight = None;
                match tracked.save(&ctx.jobs).await {
                    Ok(()) => {
                        logger.progress("Stage complete");
                        continue;
                    }
                    Err(WorkerError::StaleWrite) => continue,
                    Err(e) => return Err(e),
                }
            }
            Err(WorkerError::StaleWrite) => continue,
            Err(e) if is_cancellation(&e) => return finish_cancelled(ctx, tracked).await,
            Err(e) => return finish_failed(ctx, tracked, e).await,
        }
    }
}

/// Dispatch one stage under its deadline.
async fn run_stage(
    ctx: &ProcessingContext,
    tracked: &mut TrackedJob,
    stage: Stage,
    cancel_rx: &watch::Receiver<bool>,
) -> WorkerResult<()> {
    if *cancel_rx.borrow() {
        return Err(WorkerError::Cancelled);
    }

    match stage {
        Stage::Planning => {
            let job = &tracked.job;
            let script = tokio::time::timeout(
                ctx.config.planning_deadline,
                run_with_retries("planning", LIGHT_STAGE_ATTEMPTS, || {
                    stages::plan::run(ctx, job)
                }),
            )
            .await
            .map_err(|_| WorkerError::Timeout("planning deadline elapsed".to_string()))??;
            tracked.job.script = Some(script);
            Ok(())
        }
        Stage::ClipGeneration => stages::clips::run(ctx, tracked, cancel_rx).await,
        Stage::MusicGeneration => stages::music::run(ctx, tracked, cancel_rx).await,
        Stage::DisclaimerPlanning => {
            let job = &tracked.job;
            let spec = tokio::time::timeout(
                ctx.config.tts_deadline,
                run_with_retries("disclaimer_planning", LIGHT_STAGE_ATTEMPTS, || {
                    stages::disclaimer::run(ctx, job)
                }),
            )
            .await
            .map_err(|_| WorkerError::Timeout("disclaimer planning deadline elapsed".to_string()))??;
            tracked.job.disclaimer_spec = Some(spec);
            Ok(())
        }
        Stage::NarrationSynthesis => stages::narration::run(ctx, tracked, cancel_rx).await,
        Stage::Composition => stages::compose::run(ctx, tracked, cancel_rx).await,
        Stage::Complete => Ok(()),
    }
}

fn is_cancellation(e: &WorkerError) -> bool {
    matches!(
        e,
        WorkerError::Cancelled
            | WorkerError::Adapter(spotgen_adapters::AdapterError::Cancelled)
            | WorkerError::Media(spotgen_media::MediaError::Cancelled)
    )
}

/// Record terminal failure and settle the quota ledger.
async fn finish_failed(
    ctx: &ProcessingContext,
    mut tracked: TrackedJob,
    err: WorkerError,
) -> WorkerResult<()> {
    let stage = tracked.job.stage;
    let kind = err.classify(stage);
    let logger = JobLogger::new(&tracked.job.job_id, stage);
    logger.failure(&format!("Job failed: {err}"));

    loop {
        tracked.job.fail(kind, err.to_string());
        if let (Some(job_error), Some(scene)) = (tracked.job.error.as_mut(), err.scene()) {
            job_error.scene = Some(scene);
        }
        match tracked.save(&ctx.jobs).await {
            Ok(()) => break,
            Err(WorkerError::StaleWrite) => {
                let stored = ctx
                    .jobs
                    .load(&tracked.job.job_id)
                    .await?
                    .ok_or_else(|| WorkerError::JobMissing(tracked.job.job_id.to_string()))?;
                if stored.job.status.is_terminal() {
                    return Ok(());
                }
                tracked = TrackedJob::new(stored.job, stored.update_time);
            }
            Err(e) => return Err(e),
        }
    }

    // Quota returns only before any paid model call was issued
    if !stage.is_paid() {
        if let Err(e) = ctx.usage.credit_back(&tracked.job.user_id).await {
            warn!(job_id = %tracked.job.job_id, "Quota credit-back failed: {}", e);
        }
    }

    Ok(())
}

/// Record caller-initiated cancellation. Quota is never credited back.
async fn finish_cancelled(ctx: &ProcessingContext, mut tracked: TrackedJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&tracked.job.job_id, tracked.job.stage);
    loop {
        tracked.job.cancel();
        match tracked.save(&ctx.jobs).await {
            Ok(()) => {
                logger.progress("Job cancelled");
                return Ok(());
            }
            Err(WorkerError::StaleWrite) => {
                let stored = ctx
                    .jobs
                    .load(&tracked.job.job_id)
                    .await?
                    .ok_or_else(|| WorkerError::JobMissing(tracked.job.job_id.to_string()))?;
                if stored.job.status.is_terminal() {
                    return Ok(());
                }
                tracked = TrackedJob::new(stored.job, stored.update_time);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll the job record for the cancellation intent and terminal states,
/// flipping the in-process flag every stage suspension point checks.
fn spawn_cancel_watcher(
    ctx: Arc<ProcessingContext>,
    job_id: JobId,
    cancel_tx: watch::Sender<bool>,
) -> JoinHandle<()> {
    let interval = ctx.config.poll_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match ctx.jobs.load(&job_id).await {
                Ok(Some(stored)) => {
                    if stored.job.cancel_requested || stored.job.status.is_terminal() {
                        let _ = cancel_tx.send(true);
                        return;
                    }
                }
                Ok(None) => {
                    let _ = cancel_tx.send(true);
                    return;
                }
                Err(e) => {
                    warn!(job_id = %job_id, "Cancel watcher read failed: {}", e);
                }
            }
        }
    })
}
