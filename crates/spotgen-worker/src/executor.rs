//! Job executor: consumes the queue and drives jobs concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use spotgen_models::JobErrorKind;
use spotgen_queue::{JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator;

/// Executor over the job stream.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run the consume loop until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let ctx = Arc::new(ProcessingContext::new(self.config.clone()).await?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodic sweep reclaiming deliveries from crashed workers
        let claim_task = self.spawn_claim_task(Arc::clone(&ctx));

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    fn spawn_claim_task(&self, ctx: Arc<ProcessingContext>) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let min_idle_ms = queue.visibility_timeout().as_millis() as u64;
                        match queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let permit = match semaphore.clone().acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Consume and dispatch available jobs.
    async fn consume_jobs(&self, ctx: &Arc<ProcessingContext>) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::internal("semaphore closed"))?;
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Drive one delivery, handling redelivery accounting and the DLQ.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let job_id = job.job_id().clone();
        info!(job_id = %job_id, "Executing job");

        match orchestrator::drive(Arc::clone(&ctx), &job_id).await {
            Ok(()) => {
                // Terminal outcome recorded on the job record (completed,
                // failed, or cancelled); the delivery is done either way
                if let Err(e) = queue.ack(&message_id).await {
                    error!(job_id = %job_id, "Failed to ack delivery: {}", e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
                }
            }
            Err(e) => {
                // Infrastructure failure: let the visibility timeout
                // redeliver, unless the attempt budget is spent
                error!(job_id = %job_id, "Job drive failed: {}", e);

                let attempts = queue.increment_attempt(&message_id).await.unwrap_or(u32::MAX);
                if attempts >= queue.max_attempts() {
                    warn!(
                        job_id = %job_id,
                        attempts,
                        "Delivery attempts exhausted, moving to DLQ"
                    );
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!(job_id = %job_id, "Failed to move job to DLQ: {}", dlq_err);
                    }
                    queue.clear_dedup(&job).await.ok();
                    Self::mark_failed(&ctx, &job_id, &e).await;
                }
            }
        }
    }

    /// Best-effort terminal failure mark for a dead-lettered job, so
    /// pollers are not left staring at `processing` forever.
    async fn mark_failed(ctx: &ProcessingContext, job_id: &spotgen_models::JobId, e: &WorkerError) {
        match ctx.jobs.load(job_id).await {
            Ok(Some(stored)) if !stored.job.status.is_terminal() => {
                let mut job = stored.job;
                job.fail(
                    JobErrorKind::AdapterTransient,
                    format!("delivery attempts exhausted: {e}"),
                );
                if let Err(save_err) = ctx
                    .jobs
                    .save_conditional(&job, stored.update_time.as_deref())
                    .await
                {
                    warn!(job_id = %job_id, "Failed to mark dead-lettered job failed: {}", save_err);
                }
            }
            Ok(_) => {}
            Err(load_err) => {
                warn!(job_id = %job_id, "Failed to load dead-lettered job: {}", load_err);
            }
        }
    }

    /// Wait for all in-flight jobs to finish.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
