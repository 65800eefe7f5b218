//! The job service: the core's only write entry-point and its read APIs.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use spotgen_firestore::{JobsRepository, ReserveOutcome, UsageRepository};
use spotgen_models::{
    derive_idempotency_key, project_progress, AdRequest, Job, JobId, JobStatus, PlanTier,
    Progress,
};
use spotgen_queue::{GenerateAdJob, JobQueue, QueueJob};

use crate::error::{ServiceError, ServiceResult};
use crate::eta::EtaEstimator;

/// Rough completion estimate returned to the submitter.
const ESTIMATED_COMPLETION_SECS: u64 = 300;

/// Receipt returned by a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub estimated_completion_secs: u64,
}

/// One page of a user's jobs.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total_count: u32,
    pub page: u32,
    pub page_size: u32,
}

/// The library-level service an HTTP layer would call.
pub struct JobService {
    jobs: JobsRepository,
    usage: UsageRepository,
    queue: Arc<JobQueue>,
    eta: EtaEstimator,
}

impl JobService {
    pub fn new(jobs: JobsRepository, usage: UsageRepository, queue: Arc<JobQueue>) -> Self {
        Self {
            jobs,
            usage,
            queue,
            eta: EtaEstimator::new(),
        }
    }

    /// Stage-timing tracker feeding `get_progress` ETAs.
    pub fn eta(&self) -> &EtaEstimator {
        &self.eta
    }

    /// Submit a new ad-generation job.
    ///
    /// Atomically: validate, reject duplicates, consume one quota unit
    /// (the conditional write IS the quota check), persist the job in
    /// `processing/planning`, enqueue. Submit-path failures after the
    /// decrement credit the unit back; nothing paid has happened yet.
    pub async fn submit(
        &self,
        user_id: &str,
        plan: PlanTier,
        request: AdRequest,
    ) -> ServiceResult<SubmitReceipt> {
        request
            .check()
            .map_err(|e| ServiceError::invalid_request(e.to_string()))?;

        let idempotency_key = derive_idempotency_key(user_id, &request);
        if let Some(existing) = self.jobs.find_by_idempotency_key(&idempotency_key).await? {
            if !existing.status.is_terminal() {
                return Err(ServiceError::AlreadySubmitted {
                    job_id: existing.job_id,
                });
            }
        }

        match self.usage.reserve(user_id, plan).await? {
            ReserveOutcome::Reserved(_) => {}
            ReserveOutcome::Exhausted(usage) => {
                return Err(ServiceError::QuotaExceeded {
                    used: usage.monthly_quota - usage.quota_remaining,
                    monthly_quota: usage.monthly_quota,
                })
            }
        }

        let job = Job::new(user_id, request, idempotency_key.clone());

        if let Err(e) = self.jobs.create(&job).await {
            self.refund(user_id).await;
            return Err(e.into());
        }

        let envelope = QueueJob::GenerateAd(GenerateAdJob {
            job_id: job.job_id.clone(),
            user_id: user_id.to_string(),
            idempotency_key,
        });
        match self.queue.enqueue(&envelope).await {
            Ok(_) => {}
            Err(e) if e.is_duplicate() => {
                // A concurrent submitter won the dedup race after our
                // record landed; roll our copy back
                self.jobs.delete(&job.job_id).await.ok();
                self.refund(user_id).await;
                let existing = self
                    .jobs
                    .find_by_idempotency_key(envelope.idempotency_key())
                    .await?
                    .map(|j| j.job_id)
                    .unwrap_or_else(|| job.job_id.clone());
                return Err(ServiceError::AlreadySubmitted { job_id: existing });
            }
            Err(e) => {
                self.jobs.delete(&job.job_id).await.ok();
                self.refund(user_id).await;
                return Err(e.into());
            }
        }

        info!(job_id = %job.job_id, user_id, "Accepted submission");
        Ok(SubmitReceipt {
            job_id: job.job_id,
            status: JobStatus::Processing,
            estimated_completion_secs: ESTIMATED_COMPLETION_SECS,
        })
    }

    /// Request cancellation. The next poll tick inside the running stage
    /// observes the flag; quota is not credited back.
    pub async fn cancel(&self, user_id: &str, job_id: &JobId) -> ServiceResult<()> {
        self.owned_job(user_id, job_id).await?;
        self.jobs.request_cancel(job_id).await?;
        Ok(())
    }

    /// Fetch a job, enforcing ownership.
    pub async fn get_job(&self, user_id: &str, job_id: &JobId) -> ServiceResult<Job> {
        self.owned_job(user_id, job_id).await
    }

    /// Project client-visible progress for a job.
    pub async fn get_progress(&self, user_id: &str, job_id: &JobId) -> ServiceResult<Progress> {
        let job = self.owned_job(user_id, job_id).await?;
        let eta = self.eta.estimate(&job);
        Ok(project_progress(&job, Some(eta)))
    }

    /// List a user's jobs, newest first.
    pub async fn list_jobs(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> ServiceResult<JobPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let (jobs, total_count) = self
            .jobs
            .list_by_user(user_id, page, page_size, status)
            .await?;
        Ok(JobPage {
            jobs,
            total_count,
            page,
            page_size,
        })
    }

    async fn owned_job(&self, user_id: &str, job_id: &JobId) -> ServiceResult<Job> {
        let stored = self
            .jobs
            .load(job_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("job {job_id}")))?;
        if stored.job.user_id != user_id {
            // Same shape as not-found so job ids cannot be probed
            return Err(ServiceError::not_found(format!("job {job_id}")));
        }
        Ok(stored.job)
    }

    async fn refund(&self, user_id: &str) {
        if let Err(e) = self.usage.credit_back(user_id).await {
            warn!(user_id, "Submit-path quota refund failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_shape() {
        let receipt = SubmitReceipt {
            job_id: JobId::from_string("job-1"),
            status: JobStatus::Processing,
            estimated_completion_secs: ESTIMATED_COMPLETION_SECS,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["estimated_completion_secs"], 300);
    }
}
