//! Firestore-backed persistence for the Spotgen pipeline.
//!
//! Two tables:
//! - `jobs`: the authoritative job record, partitioned by job id, with a
//!   user index (queried via `runQuery`) and a TTL field.
//! - `usage`: the monthly quota ledger, keyed by `{user_id}_{period}`.
//!
//! All writes after creation are conditional on the document's
//! `updateTime`, which is the store's compare-and-swap primitive.

pub mod client;
#[cfg(test)]
mod client_tests;
pub mod error;
pub mod jobs_repo;
pub mod retry;
pub mod types;
pub mod usage_repo;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use jobs_repo::{JobsRepository, StoredJob, JOBS_COLLECTION};
pub use retry::{with_retry, RetryConfig};
pub use types::{from_fields, json_to_value, to_fields, value_to_json, Document, Value};
pub use usage_repo::{ReserveOutcome, UsageRepository, USAGE_COLLECTION};
