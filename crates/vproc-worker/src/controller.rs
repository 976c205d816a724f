//! Job lifecycle controller.
//!
//! Drives one job through notify-processing, transcode and the done report,
//! and classifies the result into an `Outcome`. Transcode failures are never
//! retried here; they are escalated to the status service and redelivery is
//! left to the transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::Instrument;
use vproc_media::Transcoder;
use vproc_models::{
    DeliveryAttempt, EncodeResult, ErrorCode, JobDescriptor, JobFailure, JobId, Outcome,
};
use vproc_queue::DeliveryPolicy;
use vproc_status::{CompletionReport, FailureReport, StatusReporter};

use crate::config::WorkerConfig;
use crate::ledger::RetryLedger;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Directory source files are resolved against
    pub input_root: PathBuf,
    /// Attempts for the done report
    pub status_update_attempts: u32,
    /// Linear backoff unit between done-report attempts
    pub backoff_unit: Duration,
    /// Transport redelivery bound, reported with every failure
    pub policy: DeliveryPolicy,
}

impl ControllerConfig {
    pub fn new(worker: &WorkerConfig, policy: DeliveryPolicy) -> Self {
        Self {
            input_root: worker.input_root.clone(),
            status_update_attempts: worker.status_update_attempts,
            backoff_unit: worker.retry_backoff_unit,
            policy,
        }
    }
}

pub struct JobController {
    transcoder: Arc<dyn Transcoder>,
    reporter: Arc<dyn StatusReporter>,
    ledger: Arc<RetryLedger>,
    config: ControllerConfig,
}

impl JobController {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        reporter: Arc<dyn StatusReporter>,
        ledger: Arc<RetryLedger>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            transcoder,
            reporter,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Source file for a job: the file name of its upload path, under the
    /// input root. `None` when the path has no file name.
    pub fn input_path(&self, job: &JobDescriptor) -> Option<PathBuf> {
        job.source_file_name()
            .map(|name| self.config.input_root.join(name))
    }

    /// Process one delivery of `job`.
    pub async fn process(&self, job: &JobDescriptor, attempt: DeliveryAttempt) -> Outcome {
        let logger = JobLogger::new(&job.job_id, "video_processing");
        let span = logger.create_span();

        async {
            let max_deliver = self.config.policy.max_deliver();
            logger.log_start(&format!("delivery {} of {}", attempt, max_deliver));

            let advisory = self.reporter.mark_processing(&job.job_id, Utc::now()).await;
            if let Some(e) = advisory.failure() {
                logger.log_warning(&format!("could not mark processing: {}", e));
            }

            let encoded = match self.input_path(job) {
                Some(input) => self.encode(&input, &job.job_id).await,
                None => Err(format!(
                    "source path {:?} has no file name",
                    job.upload_file_path
                )),
            };

            let outcome = match encoded {
                Ok(result) => self.confirm_done(&job.job_id, result, &logger).await,
                Err(reason) => {
                    logger.log_error(&format!("encoding failed: {}", reason));
                    self.escalate(&job.job_id, attempt, reason, &logger).await
                }
            };

            if outcome.is_success() {
                logger.log_completion("reported done");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn encode(&self, input: &Path, job_id: &JobId) -> Result<EncodeResult, String> {
        let started = Instant::now();
        let result = self
            .transcoder
            .encode(input, job_id)
            .await
            .map_err(|e| e.detailed());
        if result.is_ok() {
            metrics::record_transcode(started.elapsed());
        }
        result
    }

    /// Report the job done, retrying the report with linear backoff. The
    /// encode is not repeated and its output is kept when the report never
    /// gets through.
    async fn confirm_done(
        &self,
        job_id: &JobId,
        result: EncodeResult,
        logger: &JobLogger,
    ) -> Outcome {
        logger.log_progress(&format!(
            "encoded {} ({}s), reporting done",
            result.stream_path, result.duration_secs
        ));

        let report = CompletionReport::new(job_id.clone(), result);
        let retry = RetryConfig::new("update_status")
            .with_max_attempts(self.config.status_update_attempts)
            .with_backoff_unit(self.config.backoff_unit);

        let result = retry_async(&retry, || self.reporter.update_status(&report)).await;
        metrics::record_status_update_retries(result.attempts().saturating_sub(1));

        match result {
            RetryResult::Success { .. } => Outcome::Success,
            RetryResult::Failed { error, attempts } => {
                logger.log_error(&format!(
                    "status update failed after {} attempts: {}",
                    attempts, error
                ));
                Outcome::Unconfirmed(JobFailure::new(
                    job_id,
                    format!("status update failed after {} attempts: {}", attempts, error),
                ))
            }
        }
    }

    /// Failure escalation for a failed transcode.
    async fn escalate(
        &self,
        job_id: &JobId,
        attempt: DeliveryAttempt,
        reason: String,
        logger: &JobLogger,
    ) -> Outcome {
        let retry_count = self.ledger.record_failure(job_id);

        let discarded = self.transcoder.discard_artifacts(job_id).await;
        if let Some(e) = discarded.failure() {
            logger.log_warning(&format!("could not discard artifacts: {}", e));
        }

        let report = FailureReport {
            job_id: job_id.clone(),
            reason: reason.clone(),
            error_code: ErrorCode::EncodingFailed,
            retry_count,
            delivery_attempt: attempt,
            max_deliveries: self.config.policy.max_deliver(),
            failed_at: Utc::now(),
        };
        let failure = JobFailure::new(job_id, reason);

        match self.reporter.report_failure(&report).await {
            Ok(true) => {
                metrics::record_escalation(Some(true));
                logger.log_progress(&format!(
                    "status service allows retry (local count {})",
                    retry_count
                ));
                Outcome::Retryable(failure)
            }
            Ok(false) => {
                metrics::record_escalation(Some(false));
                self.ledger.clear(job_id);
                logger.log_error("status service declared the job permanently failed");
                Outcome::Terminal(failure)
            }
            Err(e) => {
                metrics::record_escalation(None);
                logger.log_error(&format!("failure report failed: {}", e));
                Outcome::Unconfirmed(failure)
            }
        }
    }
}
