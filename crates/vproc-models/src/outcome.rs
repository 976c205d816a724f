//! Per-delivery outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Error code attached to a failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The transcode step failed
    EncodingFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EncodingFailed => "ENCODING_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport delivery counter for the message currently being handled.
///
/// Starts at 1 on first delivery and is maintained by the transport, so it
/// survives worker restarts. Not to be confused with the process-local
/// failure count kept by the retry ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryAttempt(pub u32);

impl DeliveryAttempt {
    pub const FIRST: DeliveryAttempt = DeliveryAttempt(1);

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeliveryAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job failure with its job ID attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job_id: JobId,
    pub reason: String,
}

impl JobFailure {
    pub fn new(job_id: &JobId, reason: impl fmt::Display) -> Self {
        Self {
            job_id: job_id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {}: {}", self.job_id, self.reason)
    }
}

/// Classified result of processing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Encoded and reported done
    Success,
    /// Failed; the status service asked for another attempt
    Retryable(JobFailure),
    /// Failed; the status service declared the job permanently failed
    Terminal(JobFailure),
    /// Failed without a confirmed classification, either because the failure
    /// report itself failed or because the done report never got through.
    /// The transport ceiling decides.
    Unconfirmed(JobFailure),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Retryable(_) => "retryable",
            Outcome::Terminal(_) => "terminal",
            Outcome::Unconfirmed(_) => "unconfirmed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Recorded failure, if the outcome is not a success.
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            Outcome::Success => None,
            Outcome::Retryable(f) | Outcome::Terminal(f) | Outcome::Unconfirmed(f) => Some(f),
        }
    }
}
