//! Worker metrics.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use vproc_models::Outcome;
use vproc_queue::AckAction;

/// Metric name constants for consistency.
pub mod names {
    /// Processed deliveries by controller outcome.
    pub const JOBS_TOTAL: &str = "vproc_jobs_total";
    /// Transport actions taken by action.
    pub const DELIVERY_ACTIONS_TOTAL: &str = "vproc_delivery_actions_total";
    /// Failure escalations by the status service's decision.
    pub const ESCALATIONS_TOTAL: &str = "vproc_escalations_total";
    /// Extra attempts spent on the post-encode status update.
    pub const STATUS_UPDATE_RETRIES_TOTAL: &str = "vproc_status_update_retries_total";
    /// Payloads terminated because they could not be decoded.
    pub const MALFORMED_PAYLOADS_TOTAL: &str = "vproc_malformed_payloads_total";
    /// Transcode wall time.
    pub const TRANSCODE_SECONDS: &str = "vproc_transcode_seconds";
}

/// Serve a Prometheus scrape endpoint on `0.0.0.0:port`.
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

pub fn record_outcome(outcome: &Outcome) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_action(action: AckAction) {
    counter!(names::DELIVERY_ACTIONS_TOTAL, "action" => action.as_str()).increment(1);
}

/// `should_retry` is `None` when the failure report itself failed.
pub fn record_escalation(should_retry: Option<bool>) {
    let label = match should_retry {
        Some(true) => "true",
        Some(false) => "false",
        None => "unknown",
    };
    counter!(names::ESCALATIONS_TOTAL, "should_retry" => label).increment(1);
}

pub fn record_status_update_retries(retries: u32) {
    if retries > 0 {
        counter!(names::STATUS_UPDATE_RETRIES_TOTAL).increment(u64::from(retries));
    }
}

pub fn record_malformed_payload() {
    counter!(names::MALFORMED_PAYLOADS_TOTAL).increment(1);
}

pub fn record_transcode(elapsed: Duration) {
    histogram!(names::TRANSCODE_SECONDS).record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        for name in [
            names::JOBS_TOTAL,
            names::DELIVERY_ACTIONS_TOTAL,
            names::ESCALATIONS_TOTAL,
            names::STATUS_UPDATE_RETRIES_TOTAL,
            names::MALFORMED_PAYLOADS_TOTAL,
            names::TRANSCODE_SECONDS,
        ] {
            assert!(name.starts_with("vproc_"));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_outcome(&Outcome::Success);
        record_action(AckAction::Nack);
        record_escalation(None);
        record_status_update_retries(2);
        record_transcode(Duration::from_millis(1500));
    }
}
