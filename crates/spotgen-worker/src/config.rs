//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs driven concurrently by this process
    pub max_concurrent_jobs: usize,
    /// Scratch directory root for in-flight media
    pub work_dir: String,
    /// Interval between cancellation/poll ticks
    pub poll_interval: Duration,
    /// Planning stage wall-clock deadline
    pub planning_deadline: Duration,
    /// Per-scene clip generation deadline
    pub scene_deadline: Duration,
    /// Music generation deadline
    pub music_deadline: Duration,
    /// TTS synthesis deadline
    pub tts_deadline: Duration,
    /// Composition deadline
    pub compose_deadline: Duration,
    /// Whole-job deadline
    pub job_deadline: Duration,
    /// How often the worker scans for orphaned pending deliveries
    pub claim_interval: Duration,
    /// Graceful shutdown drain timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: "/tmp/spotgen".to_string(),
            poll_interval: Duration::from_secs(5),
            planning_deadline: Duration::from_secs(120),
            scene_deadline: Duration::from_secs(300),
            music_deadline: Duration::from_secs(300),
            tts_deadline: Duration::from_secs(120),
            compose_deadline: Duration::from_secs(600),
            job_deadline: Duration::from_secs(1800),
            claim_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_usize("WORKER_MAX_JOBS", defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            poll_interval: env_secs("WORKER_POLL_INTERVAL_SECS", defaults.poll_interval),
            planning_deadline: env_secs("WORKER_PLANNING_DEADLINE_SECS", defaults.planning_deadline),
            scene_deadline: env_secs("WORKER_SCENE_DEADLINE_SECS", defaults.scene_deadline),
            music_deadline: env_secs("WORKER_MUSIC_DEADLINE_SECS", defaults.music_deadline),
            tts_deadline: env_secs("WORKER_TTS_DEADLINE_SECS", defaults.tts_deadline),
            compose_deadline: env_secs("WORKER_COMPOSE_DEADLINE_SECS", defaults.compose_deadline),
            job_deadline: env_secs("WORKER_JOB_DEADLINE_SECS", defaults.job_deadline),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stage_budgets() {
        let config = WorkerConfig::default();
        assert_eq!(config.planning_deadline, Duration::from_secs(120));
        assert_eq!(config.scene_deadline, Duration::from_secs(300));
        assert_eq!(config.compose_deadline, Duration::from_secs(600));
        assert_eq!(config.job_deadline, Duration::from_secs(1800));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }
}
