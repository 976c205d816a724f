//! Delivery dispatcher: decode, process, and apply the ack policy.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use vproc_models::{DeliveryAttempt, JobDescriptor, Outcome};
use vproc_queue::{AckAction, AckHandle, Delivery, DeliveryPolicy};

use crate::controller::JobController;
use crate::metrics;
use crate::retry::FailureTracker;

/// Consecutive heartbeat failures logged per delivery before going quiet.
const HEARTBEAT_LOGGED_FAILURES: u32 = 3;

/// Routes each delivery through the controller and makes the single
/// ack / nack / term call for it.
pub struct Dispatcher {
    controller: Arc<JobController>,
    policy: DeliveryPolicy,
    heartbeat_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        controller: Arc<JobController>,
        policy: DeliveryPolicy,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            controller,
            policy,
            heartbeat_interval,
        }
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    /// Handle one delivery and return the action taken.
    pub async fn handle(&self, delivery: Delivery) -> AckAction {
        let attempt = delivery.attempt();

        let job = match delivery.decode() {
            Ok(job) => job,
            Err(e) => {
                metrics::record_malformed_payload();
                warn!(
                    message_id = delivery.message_id(),
                    delivery = %attempt,
                    "Terminating malformed payload: {}", e
                );
                let action = self.policy.for_malformed();
                let reason = format!("malformed payload: {}", e);
                self.apply(delivery.into_handle(), action, &reason).await;
                return action;
            }
        };

        let handle = delivery.into_handle();
        let outcome = self.process_with_heartbeat(&job, attempt, &handle).await;
        metrics::record_outcome(&outcome);

        let action = self.policy.for_outcome(&outcome, attempt);
        let reason = self.term_reason(&outcome, attempt);
        info!(
            job_id = %job.job_id,
            delivery = %attempt,
            outcome = outcome.as_str(),
            action = %action,
            "Delivery disposition"
        );
        self.apply(handle, action, &reason).await;
        action
    }

    /// Run the controller while periodically extending the delivery's
    /// processing deadline.
    async fn process_with_heartbeat(
        &self,
        job: &JobDescriptor,
        attempt: DeliveryAttempt,
        handle: &AckHandle,
    ) -> Outcome {
        let start = tokio::time::Instant::now() + self.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(start, self.heartbeat_interval);
        let mut tracker = FailureTracker::new(HEARTBEAT_LOGGED_FAILURES);

        let process = self.controller.process(job, attempt);
        tokio::pin!(process);

        loop {
            tokio::select! {
                outcome = &mut process => return outcome,
                _ = ticker.tick() => match handle.in_progress().await {
                    Ok(()) => {
                        tracker.record_success();
                        debug!(job_id = %job.job_id, "Extended processing deadline");
                    }
                    Err(e) => {
                        if tracker.record_failure() {
                            warn!(
                                job_id = %job.job_id,
                                "Failed to extend processing deadline: {}", e
                            );
                        }
                    }
                },
            }
        }
    }

    fn term_reason(&self, outcome: &Outcome, attempt: DeliveryAttempt) -> String {
        match outcome {
            Outcome::Success => String::new(),
            Outcome::Terminal(failure) => failure.reason.clone(),
            Outcome::Retryable(failure) | Outcome::Unconfirmed(failure) => format!(
                "delivery limit reached ({} of {}): {}",
                attempt,
                self.policy.max_deliver(),
                failure.reason
            ),
        }
    }

    async fn apply(&self, handle: AckHandle, action: AckAction, reason: &str) {
        let message_id = handle.message_id().to_string();
        let result = match action {
            AckAction::Ack => handle.ack().await,
            AckAction::Nack => handle.nack().await,
            AckAction::Term => handle.term(reason).await,
        };
        metrics::record_action(action);

        // An unconfirmed disposition leaves the entry pending; the claim sweep
        // redelivers it after the ack wait.
        if let Err(e) = result {
            error!(
                message_id = %message_id,
                action = %action,
                "Failed to {} delivery: {}", action, e
            );
        }
    }
}
