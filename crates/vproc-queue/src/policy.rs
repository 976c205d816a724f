//! Ack/redelivery policy.
//!
//! Maps a processed delivery to exactly one transport action. The transport
//! delivery counter is authoritative: once it reaches `max_retries + 1` the
//! message is terminated no matter what the controller concluded.

use std::fmt;

use vproc_models::{DeliveryAttempt, Outcome};

/// Transport action for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckAction {
    /// Processing finished; remove the message
    Ack,
    /// Leave the message for redelivery
    Nack,
    /// Never deliver again; dead-letter the message
    Term,
}

impl AckAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckAction::Ack => "ack",
            AckAction::Nack => "nack",
            AckAction::Term => "term",
        }
    }
}

impl fmt::Display for AckAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with an entry whose processing deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Hand the entry out again as this attempt
    Redeliver(DeliveryAttempt),
    /// Every allowed delivery was used; the payload is the last one made
    Exhausted(DeliveryAttempt),
}

/// Bounded redelivery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    max_retries: u32,
}

impl DeliveryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// One original delivery plus `max_retries` redeliveries.
    pub fn max_deliver(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether the transport will never redeliver after this attempt.
    pub fn is_final(&self, attempt: DeliveryAttempt) -> bool {
        attempt.get() >= self.max_deliver()
    }

    /// Decide the fate of an expired entry that was delivered `prior` times.
    pub fn for_expired(&self, prior: u32) -> ClaimDecision {
        if prior < self.max_deliver() {
            ClaimDecision::Redeliver(DeliveryAttempt(prior.saturating_add(1)))
        } else {
            ClaimDecision::Exhausted(DeliveryAttempt(prior))
        }
    }

    /// A payload that cannot be decoded is never retried.
    pub fn for_malformed(&self) -> AckAction {
        AckAction::Term
    }

    /// Action for a delivery the controller processed.
    pub fn for_outcome(&self, outcome: &Outcome, attempt: DeliveryAttempt) -> AckAction {
        match outcome {
            Outcome::Success => AckAction::Ack,
            Outcome::Terminal(_) => AckAction::Term,
            Outcome::Retryable(_) | Outcome::Unconfirmed(_) if self.is_final(attempt) => {
                AckAction::Term
            }
            Outcome::Retryable(_) | Outcome::Unconfirmed(_) => AckAction::Nack,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproc_models::{JobFailure, JobId};

    fn failure() -> JobFailure {
        JobFailure::new(&JobId::from("v1"), "ffmpeg exited 1")
    }

    #[test]
    fn test_max_deliver_counts_original_delivery() {
        assert_eq!(DeliveryPolicy::new(2).max_deliver(), 3);
        assert_eq!(DeliveryPolicy::new(0).max_deliver(), 1);
        assert_eq!(DeliveryPolicy::new(u32::MAX).max_deliver(), u32::MAX);
    }

    #[test]
    fn test_success_is_acked_even_on_final_delivery() {
        let policy = DeliveryPolicy::new(2);
        assert_eq!(policy.for_outcome(&Outcome::Success, DeliveryAttempt(1)), AckAction::Ack);
        assert_eq!(policy.for_outcome(&Outcome::Success, DeliveryAttempt(3)), AckAction::Ack);
    }

    #[test]
    fn test_retryable_below_ceiling_is_nacked() {
        let policy = DeliveryPolicy::new(2);
        let outcome = Outcome::Retryable(failure());
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(1)), AckAction::Nack);
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(2)), AckAction::Nack);
    }

    #[test]
    fn test_ceiling_overrides_retryable() {
        let policy = DeliveryPolicy::new(2);
        let outcome = Outcome::Retryable(failure());
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(3)), AckAction::Term);
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(7)), AckAction::Term);
    }

    #[test]
    fn test_terminal_is_terminated_below_ceiling() {
        let policy = DeliveryPolicy::new(2);
        let outcome = Outcome::Terminal(failure());
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(1)), AckAction::Term);
    }

    #[test]
    fn test_unconfirmed_follows_transport_ceiling() {
        let policy = DeliveryPolicy::new(1);
        let outcome = Outcome::Unconfirmed(failure());
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(1)), AckAction::Nack);
        assert_eq!(policy.for_outcome(&outcome, DeliveryAttempt(2)), AckAction::Term);
    }

    #[test]
    fn test_expired_below_ceiling_is_redelivered() {
        let policy = DeliveryPolicy::new(2);
        assert_eq!(policy.for_expired(1), ClaimDecision::Redeliver(DeliveryAttempt(2)));
        assert_eq!(policy.for_expired(2), ClaimDecision::Redeliver(DeliveryAttempt(3)));
    }

    #[test]
    fn test_expired_at_ceiling_is_exhausted() {
        let policy = DeliveryPolicy::new(2);
        assert_eq!(policy.for_expired(3), ClaimDecision::Exhausted(DeliveryAttempt(3)));
    }

    #[test]
    fn test_expired_above_ceiling_keeps_observed_count() {
        let policy = DeliveryPolicy::new(2);
        assert_eq!(policy.for_expired(5), ClaimDecision::Exhausted(DeliveryAttempt(5)));
        assert_eq!(
            DeliveryPolicy::new(0).for_expired(u32::MAX),
            ClaimDecision::Exhausted(DeliveryAttempt(u32::MAX))
        );
    }

    #[test]
    fn test_malformed_is_terminated() {
        assert_eq!(DeliveryPolicy::default().for_malformed(), AckAction::Term);
    }
}
