//! Redis Streams job queue for the worker fleet.
//!
//! The queue carries pointers to job records, not job state: the store is
//! authoritative and a redelivered message simply re-drives the job from
//! whatever stage it durably reached. Enqueue is idempotent on the job's
//! dedup key, pending entries idle past the visibility window are claimed
//! by live workers, and deliveries that exhaust their attempts land in a
//! dead letter stream.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{GenerateAdJob, QueueJob};
pub use queue::{JobQueue, QueueConfig};
