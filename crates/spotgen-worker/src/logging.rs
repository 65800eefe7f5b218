//! Structured job logging utilities.

use spotgen_models::{JobId, Stage};
use tracing::{error, info, warn};

/// Job logger with consistent contextual fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: Stage,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: Stage) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage,
        }
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }

    pub fn failure(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }
}
