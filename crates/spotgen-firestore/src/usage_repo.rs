//! Usage table repository: the monthly quota ledger.
//!
//! The check-and-decrement is a conditional write: decrement happens only
//! when `quota_remaining > 0` was observed AND nobody else wrote the
//! document since we read it (`updateTime` precondition). A precondition
//! failure means a concurrent writer, so we re-read and re-check; an
//! observed zero is authoritative for `QuotaExceeded` without a second
//! round-trip.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use spotgen_models::{current_period, usage_doc_id, PlanTier, Usage};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{from_fields, to_fields};

/// Collection holding usage documents, keyed by `{user_id}_{period}`.
pub const USAGE_COLLECTION: &str = "usage";

/// Maximum retries for the optimistic-locking loop.
const MAX_RESERVE_RETRIES: u32 = 5;

/// Base delay for backoff between optimistic retries (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

/// Result of a reservation attempt.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// One unit of quota was consumed.
    Reserved(Usage),
    /// `quota_remaining` was 0; nothing was written.
    Exhausted(Usage),
}

/// Repository over the usage table.
#[derive(Clone)]
pub struct UsageRepository {
    client: FirestoreClient,
}

impl UsageRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Read a user's usage for the current period.
    pub async fn get_current(&self, user_id: &str) -> FirestoreResult<Option<Usage>> {
        let period = current_period();
        let doc_id = usage_doc_id(user_id, &period);
        let doc = self.client.get_document(USAGE_COLLECTION, &doc_id).await?;
        match doc.and_then(|d| d.fields) {
            Some(fields) => Ok(Some(from_fields(&fields)?)),
            None => Ok(None),
        }
    }

    /// Atomically consume one unit of this month's quota.
    pub async fn reserve(&self, user_id: &str, plan: PlanTier) -> FirestoreResult<ReserveOutcome> {
        let period = current_period();
        let doc_id = usage_doc_id(user_id, &period);

        for attempt in 0..MAX_RESERVE_RETRIES {
            let doc = self.client.get_document(USAGE_COLLECTION, &doc_id).await?;

            let (mut usage, update_time) = match doc {
                Some(d) => {
                    let fields = d.fields.as_ref().ok_or_else(|| {
                        FirestoreError::invalid_response("usage document has no fields")
                    })?;
                    (from_fields::<Usage>(fields)?, d.update_time)
                }
                None => {
                    // First submission of the period: create the record with
                    // one unit consumed. A concurrent creator loses on the
                    // documentId and we fall back to the update path.
                    let mut usage = Usage::new(user_id, period.clone(), plan);
                    usage.quota_remaining -= 1;
                    usage.request_count = 1;
                    match self
                        .client
                        .create_document(USAGE_COLLECTION, &doc_id, to_fields(&usage)?)
                        .await
                    {
                        Ok(_) => {
                            info!(user_id, period = %period, "Opened usage period");
                            return Ok(ReserveOutcome::Reserved(usage));
                        }
                        Err(FirestoreError::AlreadyExists(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
            };

            if usage.quota_remaining == 0 {
                debug!(user_id, period = %period, "Quota exhausted");
                return Ok(ReserveOutcome::Exhausted(usage));
            }

            usage.quota_remaining -= 1;
            usage.request_count += 1;
            usage.last_updated = Utc::now();

            match self
                .client
                .update_document_with_precondition(
                    USAGE_COLLECTION,
                    &doc_id,
                    to_fields(&usage)?,
                    None,
                    update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(
                        user_id,
                        remaining = usage.quota_remaining,
                        "Reserved quota unit"
                    );
                    return Ok(ReserveOutcome::Reserved(usage));
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        user_id,
                        attempt = attempt + 1,
                        "Quota reservation lost the write race, retrying"
                    );
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(user_id, retries = MAX_RESERVE_RETRIES, "Quota reservation failed after retries");
        Err(FirestoreError::request_failed(
            "quota reservation failed due to concurrent updates",
        ))
    }

    /// Return one unit of quota. Only used for failures at or before the
    /// planning stage (before any paid model call).
    pub async fn credit_back(&self, user_id: &str) -> FirestoreResult<()> {
        let period = current_period();
        let doc_id = usage_doc_id(user_id, &period);

        for attempt in 0..MAX_RESERVE_RETRIES {
            let doc = self.client.get_document(USAGE_COLLECTION, &doc_id).await?;
            let (mut usage, update_time) = match doc {
                Some(d) => {
                    let fields = d.fields.as_ref().ok_or_else(|| {
                        FirestoreError::invalid_response("usage document has no fields")
                    })?;
                    (from_fields::<Usage>(fields)?, d.update_time)
                }
                None => return Ok(()),
            };

            usage.quota_remaining = (usage.quota_remaining + 1).min(usage.monthly_quota);
            usage.request_count = usage.request_count.saturating_sub(1);
            usage.last_updated = Utc::now();

            match self
                .client
                .update_document_with_precondition(
                    USAGE_COLLECTION,
                    &doc_id,
                    to_fields(&usage)?,
                    None,
                    update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(user_id, remaining = usage.quota_remaining, "Credited quota back");
                    return Ok(());
                }
                Err(e) if e.is_precondition_failed() => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(
            "quota credit-back failed due to concurrent updates",
        ))
    }

    /// Record a completed video against the period's bookkeeping counters.
    pub async fn record_completion(
        &self,
        user_id: &str,
        video_duration_secs: u32,
    ) -> FirestoreResult<()> {
        let period = current_period();
        let doc_id = usage_doc_id(user_id, &period);

        for attempt in 0..MAX_RESERVE_RETRIES {
            let doc = self.client.get_document(USAGE_COLLECTION, &doc_id).await?;
            let (mut usage, update_time) = match doc {
                Some(d) => {
                    let fields = d.fields.as_ref().ok_or_else(|| {
                        FirestoreError::invalid_response("usage document has no fields")
                    })?;
                    (from_fields::<Usage>(fields)?, d.update_time)
                }
                // Completion can land in a later period than the submit;
                // counters then attach to the period the video finished in.
                None => {
                    let usage = Usage::new(user_id, period.clone(), PlanTier::Free);
                    (usage, None)
                }
            };

            usage.videos_generated += 1;
            usage.total_duration_secs += video_duration_secs;
            usage.last_updated = Utc::now();

            let result = if update_time.is_some() {
                self.client
                    .update_document_with_precondition(
                        USAGE_COLLECTION,
                        &doc_id,
                        to_fields(&usage)?,
                        None,
                        update_time.as_deref(),
                    )
                    .await
                    .map(|_| ())
            } else {
                match self
                    .client
                    .create_document(USAGE_COLLECTION, &doc_id, to_fields(&usage)?)
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(FirestoreError::AlreadyExists(_)) => {
                        continue;
                    }
                    Err(e) => Err(e),
                }
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_precondition_failed() => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(FirestoreError::request_failed(
            "usage completion update failed due to concurrent updates",
        ))
    }
}
