//! Bounded retry with backoff.
//!
//! Generic over the operation; nothing here knows about queues, encoders or
//! the status service.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay of `attempt × unit` after the `attempt`-th failure.
pub fn linear_backoff(unit: Duration) -> impl Fn(u32) -> Duration + Send + Sync + Clone {
    move |attempt| unit.saturating_mul(attempt)
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded on attempt `attempts`.
    Success { value: T, attempts: u32 },
    /// Operation failed on every attempt; `error` is the last one.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }

    /// Number of calls made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Call `operation` up to `max_attempts` times, sleeping `backoff(n)` after
/// the `n`-th failure. No sleep follows the last attempt.
///
/// `max_attempts` of 0 is treated as 1.
pub async fn retry_with_backoff<F, Fut, T, E, B>(
    max_attempts: u32,
    backoff: B,
    operation: F,
) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => {
                return RetryResult::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) if attempt >= max_attempts => {
                return RetryResult::Failed {
                    error,
                    attempts: attempt,
                }
            }
            Err(_) => {
                tokio::time::sleep(backoff(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Configuration for retry behavior with linear backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Attempt `n` is followed by a `n × backoff_unit` pause.
    pub backoff_unit: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }
}

/// `retry_with_backoff` with linear backoff and a log line per failure.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let backoff = linear_backoff(config.backoff_unit);
    let max_attempts = config.max_attempts.max(1);
    let name = &config.operation_name;

    let result = retry_with_backoff(max_attempts, backoff, || {
        let call = operation();
        async move {
            let result = call.await;
            if let Err(e) = &result {
                debug!("{} attempt failed: {}", name, e);
            }
            result
        }
    })
    .await;

    if let RetryResult::Failed { error, attempts } = &result {
        warn!("{} failed after {} attempts: {}", name, attempts, error);
    }
    result
}

/// State tracker for repeated operations that may fail intermittently.
///
/// Used by background loops (like delivery heartbeats) to keep a flaky
/// dependency from flooding the logs.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else {
            if !self.suppressed {
                self.suppressed = true;
                warn!(
                    "Suppressing further failure logs after {} consecutive failures",
                    self.max_logged_failures
                );
            }
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
