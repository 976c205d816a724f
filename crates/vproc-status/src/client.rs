//! Status service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, warn};
use vproc_models::{Advisory, JobId};

use crate::error::{StatusError, StatusResult};
use crate::reporter::StatusReporter;
use crate::types::{
    CompletionReport, FailureReport, FailureRequest, ProcessingRequest, StatusResponse,
    StatusUpdateRequest,
};

/// Configuration for the status client.
#[derive(Debug, Clone)]
pub struct StatusClientConfig {
    /// Base URL of the status service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Identity sent with every call
    pub worker_id: String,
}

impl Default for StatusClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:50051".to_string(),
            timeout: Duration::from_secs(30),
            worker_id: "worker-1".to_string(),
        }
    }
}

impl StatusClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("STATUS_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:50051".to_string()),
            timeout: Duration::from_secs(
                std::env::var("STATUS_SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            worker_id: std::env::var("WORKER_ID").unwrap_or_else(|_| "worker-1".to_string()),
        }
    }
}

/// HTTP client for the status-tracking service.
///
/// Each call is made exactly once. Retrying is the caller's decision.
pub struct StatusClient {
    http: Client,
    base_url: Url,
    config: StatusClientConfig,
}

impl StatusClient {
    pub fn new(config: StatusClientConfig) -> StatusResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StatusError::Network)?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StatusError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StatusError::InvalidUrl(config.base_url.clone()));
        }

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn from_env() -> StatusResult<Self> {
        Self::new(StatusClientConfig::from_env())
    }

    pub fn config(&self) -> &StatusClientConfig {
        &self.config
    }

    /// `{base}/v1/videos/{job_id}/{action}`, with the job ID encoded as a
    /// single path segment.
    fn url(&self, job_id: &JobId, action: &str) -> StatusResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StatusError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["v1", "videos", job_id.as_str(), action]);
        Ok(url)
    }

    /// POST a JSON body to one of the job's endpoints and return the accepted
    /// response.
    async fn post<B: Serialize + ?Sized>(
        &self,
        job_id: &JobId,
        action: &str,
        body: &B,
    ) -> StatusResult<StatusResponse> {
        let url = self.url(job_id, action)?;
        debug!("POST {}", url);

        let response = self.http.post(url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StatusError::RequestFailed { status, body });
        }

        let bytes = response.bytes().await?;
        let parsed: StatusResponse = serde_json::from_slice(&bytes)
            .map_err(|e| StatusError::InvalidResponse(e.to_string()))?;

        if !parsed.success {
            return Err(StatusError::Rejected(parsed.message));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl StatusReporter for StatusClient {
    async fn mark_processing(&self, job_id: &JobId, started_at: DateTime<Utc>) -> Advisory {
        let body = ProcessingRequest {
            worker_id: &self.config.worker_id,
            started_at,
        };
        let result = self.post(job_id, "processing", &body).await;
        if let Err(e) = &result {
            warn!(job_id = %job_id, "Failed to mark processing: {}", e);
        }
        result.map(|_| ()).into()
    }

    async fn update_status(&self, report: &CompletionReport) -> StatusResult<()> {
        let body = StatusUpdateRequest::done(report, &self.config.worker_id);
        self.post(&report.job_id, "status", &body).await?;
        Ok(())
    }

    async fn report_failure(&self, report: &FailureReport) -> StatusResult<bool> {
        let body = FailureRequest::from_report(report, &self.config.worker_id);
        let response = self.post(&report.job_id, "failure", &body).await?;
        response.should_retry.ok_or_else(|| {
            StatusError::InvalidResponse("failure response is missing should_retry".to_string())
        })
    }
}
