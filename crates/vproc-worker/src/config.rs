//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
///
/// Transport settings (`REDIS_URL`, `MAX_RETRIES`, ...) live in
/// `vproc_queue::QueueConfig`; the retry ceiling is read from there only.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity reported to the status service and used as the consumer name
    pub worker_id: String,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Attempts for the post-encode status update
    pub status_update_attempts: u32,
    /// Linear backoff unit between status update attempts
    pub retry_backoff_unit: Duration,
    /// How often expired pending deliveries are reclaimed
    pub claim_interval: Duration,
    /// How often an in-flight delivery's deadline is extended
    pub heartbeat_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Directory the source files are read from
    pub input_root: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".to_string(),
            max_concurrent_jobs: 3,
            status_update_attempts: 3,
            retry_backoff_unit: Duration::from_secs(5),
            claim_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(60),
            input_root: PathBuf::from("./uploads/videos"),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or_else(|_| "worker-1".to_string()),
            max_concurrent_jobs: std::env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            status_update_attempts: std::env::var("STATUS_UPDATE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_backoff_unit: Duration::from_secs(
                std::env::var("RETRY_BACKOFF_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            input_root: std::env::var("INPUT_VIDEO_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./uploads/videos")),
        }
    }

    /// Reject settings the executor cannot run with.
    pub fn validate(&self, ack_wait: Duration) -> WorkerResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("MAX_CONCURRENT_JOBS must be at least 1"));
        }
        if self.status_update_attempts == 0 {
            return Err(WorkerError::config_error("STATUS_UPDATE_ATTEMPTS must be at least 1"));
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= ack_wait {
            return Err(WorkerError::config_error(format!(
                "WORKER_HEARTBEAT_SECS ({:?}) must be non-zero and shorter than the ack wait ({:?})",
                self.heartbeat_interval, ack_wait
            )));
        }
        if self.claim_interval.is_zero() {
            return Err(WorkerError::config_error("WORKER_CLAIM_INTERVAL_SECS must be non-zero"));
        }
        Ok(())
    }
}
