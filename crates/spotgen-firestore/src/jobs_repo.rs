//! Jobs table repository.
//!
//! The job document is the single authoritative record of a job. All
//! mutations after creation go through `save_conditional`, keyed on the
//! `updateTime` read together with the record, so a concurrent cancel or
//! stage advance invalidates a worker's stale write instead of clobbering.

use tracing::{debug, info};

use spotgen_models::{Job, JobId, JobStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{from_fields, to_fields, FieldReference, Filter, Order};

/// Collection holding job documents, keyed by job id.
pub const JOBS_COLLECTION: &str = "jobs";

/// Upper bound on documents fetched for a user listing.
const LIST_FETCH_CAP: u32 = 500;

const MAX_CANCEL_RETRIES: u32 = 5;

/// A job together with its optimistic-locking token.
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job: Job,
    /// `updateTime` of the document at read time; pass back to
    /// `save_conditional` to detect concurrent writers.
    pub update_time: Option<String>,
}

/// Repository over the jobs table.
#[derive(Clone)]
pub struct JobsRepository {
    client: FirestoreClient,
    retry: RetryConfig,
}

impl JobsRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Persist a brand-new job. Fails with `AlreadyExists` on id collision.
    pub async fn create(&self, job: &Job) -> FirestoreResult<()> {
        let fields = to_fields(job)?;
        self.client
            .create_document(JOBS_COLLECTION, job.job_id.as_str(), fields)
            .await?;
        info!(job_id = %job.job_id, user_id = %job.user_id, "Created job record");
        Ok(())
    }

    /// Load a job and its locking token.
    pub async fn load(&self, job_id: &JobId) -> FirestoreResult<Option<StoredJob>> {
        let doc = with_retry(&self.retry, "jobs_load", || async {
            self.client.get_document(JOBS_COLLECTION, job_id.as_str()).await
        })
        .await?;

        match doc {
            Some(doc) => {
                let fields = doc
                    .fields
                    .as_ref()
                    .ok_or_else(|| FirestoreError::invalid_response("job document has no fields"))?;
                let job: Job = from_fields(fields)?;
                Ok(Some(StoredJob {
                    job,
                    update_time: doc.update_time,
                }))
            }
            None => Ok(None),
        }
    }

    /// Write the full job document conditioned on the token it was read
    /// with. Returns the new token.
    pub async fn save_conditional(
        &self,
        job: &Job,
        update_time: Option<&str>,
    ) -> FirestoreResult<Option<String>> {
        let fields = to_fields(job)?;
        let doc = self
            .client
            .update_document_with_precondition(
                JOBS_COLLECTION,
                job.job_id.as_str(),
                fields,
                None,
                update_time,
            )
            .await?;
        debug!(job_id = %job.job_id, stage = %job.stage, status = %job.status, "Saved job record");
        Ok(doc.update_time)
    }

    /// Flip the cancellation intent flag. Returns `false` when the job is
    /// already terminal (nothing to cancel).
    pub async fn request_cancel(&self, job_id: &JobId) -> FirestoreResult<bool> {
        for _attempt in 0..MAX_CANCEL_RETRIES {
            let stored = match self.load(job_id).await? {
                Some(s) => s,
                None => return Err(FirestoreError::not_found(job_id.to_string())),
            };

            if stored.job.status.is_terminal() {
                return Ok(false);
            }
            if stored.job.cancel_requested {
                return Ok(true);
            }

            let mut job = stored.job;
            job.cancel_requested = true;
            job.updated_at = chrono::Utc::now();

            match self
                .save_conditional(&job, stored.update_time.as_deref())
                .await
            {
                Ok(_) => {
                    info!(job_id = %job_id, "Cancellation requested");
                    return Ok(true);
                }
                Err(e) if e.is_precondition_failed() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FirestoreError::request_failed(
            "cancel lost the write race repeatedly",
        ))
    }

    /// Find a live job by its idempotency key.
    pub async fn find_by_idempotency_key(&self, key: &str) -> FirestoreResult<Option<Job>> {
        let docs = self
            .client
            .run_query(
                JOBS_COLLECTION,
                Some(Filter::field_eq("idempotency_key", key)),
                vec![],
                Some(1),
                None,
            )
            .await?;

        match docs.first().and_then(|d| d.fields.as_ref()) {
            Some(fields) => Ok(Some(from_fields(fields)?)),
            None => Ok(None),
        }
    }

    /// List a user's jobs, newest first, paged.
    ///
    /// Fetches at most `LIST_FETCH_CAP` documents; users past that keep
    /// their most recent jobs visible, which is the UI contract.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> FirestoreResult<(Vec<Job>, u32)> {
        let mut filters = vec![Filter::field_eq("user_id", user_id)];
        if let Some(status) = status {
            filters.push(Filter::field_eq("status", status.as_str()));
        }
        let filter = if filters.len() == 1 {
            filters.pop()
        } else {
            Some(Filter::and(filters))
        };

        let docs = self
            .client
            .run_query(
                JOBS_COLLECTION,
                filter,
                vec![Order {
                    field: FieldReference {
                        field_path: "created_at".to_string(),
                    },
                    direction: "DESCENDING".to_string(),
                }],
                Some(LIST_FETCH_CAP),
                None,
            )
            .await?;

        let jobs: Vec<Job> = docs
            .iter()
            .filter_map(|d| d.fields.as_ref())
            .filter_map(|f| from_fields(f).ok())
            .collect();

        let total = jobs.len() as u32;
        let start = (page.saturating_sub(1) as usize) * page_size as usize;
        let page_jobs = jobs
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();

        Ok((page_jobs, total))
    }

    /// Delete a job record (submit-path rollback).
    pub async fn delete(&self, job_id: &JobId) -> FirestoreResult<()> {
        self.client
            .delete_document(JOBS_COLLECTION, job_id.as_str())
            .await
    }
}
