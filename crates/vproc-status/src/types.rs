//! Status service request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vproc_models::{DeliveryAttempt, EncodeResult, ErrorCode, JobId};

/// Everything the worker knows about a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub job_id: JobId,
    pub result: EncodeResult,
    pub completed_at: DateTime<Utc>,
}

impl CompletionReport {
    pub fn new(job_id: JobId, result: EncodeResult) -> Self {
        Self {
            job_id,
            result,
            completed_at: Utc::now(),
        }
    }
}

/// A failure escalation.
///
/// `retry_count` and `delivery_attempt` are different counters and are never
/// merged. `retry_count` is the number of failures this worker process has
/// seen for the job before this one; it restarts at 0 with the process.
/// `delivery_attempt` is the transport's delivery counter, which survives
/// restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub job_id: JobId,
    pub reason: String,
    pub error_code: ErrorCode,
    pub retry_count: u32,
    pub delivery_attempt: DeliveryAttempt,
    /// Transport ceiling (`max_retries + 1`)
    pub max_deliveries: u32,
    pub failed_at: DateTime<Utc>,
}

/// `POST /v1/videos/{id}/processing`
#[derive(Debug, Serialize)]
pub(crate) struct ProcessingRequest<'a> {
    pub worker_id: &'a str,
    pub started_at: DateTime<Utc>,
}

/// `POST /v1/videos/{id}/status`
#[derive(Debug, Serialize)]
pub(crate) struct StatusUpdateRequest<'a> {
    pub status: &'static str,
    pub stream_path: &'a str,
    pub thumbnail_path: Option<&'a str>,
    pub duration: u64,
    pub completed_at: DateTime<Utc>,
    pub worker_id: &'a str,
}

impl<'a> StatusUpdateRequest<'a> {
    pub fn done(report: &'a CompletionReport, worker_id: &'a str) -> Self {
        Self {
            status: "done",
            stream_path: &report.result.stream_path,
            thumbnail_path: report.result.thumbnail_path.as_deref(),
            duration: report.result.duration_secs,
            completed_at: report.completed_at,
            worker_id,
        }
    }
}

/// `POST /v1/videos/{id}/failure`
#[derive(Debug, Serialize)]
pub(crate) struct FailureRequest<'a> {
    pub reason: &'a str,
    pub error_code: ErrorCode,
    pub retry_count: u32,
    pub delivery_attempt: DeliveryAttempt,
    pub max_deliveries: u32,
    pub failed_at: DateTime<Utc>,
    pub worker_id: &'a str,
}

impl<'a> FailureRequest<'a> {
    pub fn from_report(report: &'a FailureReport, worker_id: &'a str) -> Self {
        Self {
            reason: &report.reason,
            error_code: report.error_code,
            retry_count: report.retry_count,
            delivery_attempt: report.delivery_attempt,
            max_deliveries: report.max_deliveries,
            failed_at: report.failed_at,
            worker_id,
        }
    }
}

/// Response body shared by every status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub should_retry: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_done_request_body() {
        let report = CompletionReport::new(
            JobId::from("v2"),
            EncodeResult::new("/out/hls/v2/playlist.m3u8").with_duration(42),
        );
        let body = serde_json::to_value(StatusUpdateRequest::done(&report, "worker-1")).unwrap();

        assert_eq!(body["status"], "done");
        assert_eq!(body["stream_path"], "/out/hls/v2/playlist.m3u8");
        assert_eq!(body["thumbnail_path"], serde_json::Value::Null);
        assert_eq!(body["duration"], 42);
        assert_eq!(body["worker_id"], "worker-1");
    }

    #[test]
    fn test_failure_request_keeps_counters_apart() {
        let report = FailureReport {
            job_id: JobId::from("v1"),
            reason: "ffmpeg exited 1".to_string(),
            error_code: ErrorCode::EncodingFailed,
            retry_count: 0,
            delivery_attempt: DeliveryAttempt(3),
            max_deliveries: 4,
            failed_at: Utc::now(),
        };
        let body = serde_json::to_value(FailureRequest::from_report(&report, "w")).unwrap();

        assert_eq!(body["error_code"], "ENCODING_FAILED");
        assert_eq!(body["retry_count"], 0);
        assert_eq!(body["delivery_attempt"], 3);
        assert_eq!(body["max_deliveries"], 4);
    }

    #[test]
    fn test_response_defaults() {
        let resp: StatusResponse = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(resp.success);
        assert!(resp.message.is_empty());
        assert!(resp.should_retry.is_none());
    }
}
