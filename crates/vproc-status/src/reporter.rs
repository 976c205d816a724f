//! Status reporter seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vproc_models::{Advisory, JobId};

use crate::error::StatusResult;
use crate::types::{CompletionReport, FailureReport};

/// Records job state in the status-tracking service.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Heartbeat that processing started. Fire-and-log.
    async fn mark_processing(&self, job_id: &JobId, started_at: DateTime<Utc>) -> Advisory;

    /// Mark the job done.
    async fn update_status(&self, report: &CompletionReport) -> StatusResult<()>;

    /// Report a failure and return the service's should-retry decision.
    async fn report_failure(&self, report: &FailureReport) -> StatusResult<bool>;
}
