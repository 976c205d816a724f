//! Delivery envelopes and their one-shot acknowledgement handles.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use vproc_models::{DecodeError, DeliveryAttempt, JobDescriptor};

use crate::error::QueueResult;

/// Transport side of an acknowledgement handle.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Mark the message processed.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Hand the message back for redelivery.
    async fn nack(&self, message_id: &str) -> QueueResult<()>;

    /// Dead-letter the message; it is never delivered again.
    async fn term(
        &self,
        message_id: &str,
        payload: &[u8],
        reason: &str,
        attempt: DeliveryAttempt,
    ) -> QueueResult<()>;

    /// Extend the processing deadline of a message still being worked on.
    async fn in_progress(&self, message_id: &str) -> QueueResult<()>;
}

/// Acknowledgement handle bound to exactly one delivery.
///
/// `ack`, `nack` and `term` consume the handle, so a delivery gets at most
/// one disposition.
pub struct AckHandle {
    message_id: String,
    payload: Arc<[u8]>,
    attempt: DeliveryAttempt,
    acker: Arc<dyn Acknowledger>,
}

impl AckHandle {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn attempt(&self) -> DeliveryAttempt {
        self.attempt
    }

    pub async fn ack(self) -> QueueResult<()> {
        self.acker.ack(&self.message_id).await
    }

    pub async fn nack(self) -> QueueResult<()> {
        self.acker.nack(&self.message_id).await
    }

    pub async fn term(self, reason: &str) -> QueueResult<()> {
        self.acker
            .term(&self.message_id, &self.payload, reason, self.attempt)
            .await
    }

    /// Not a disposition; may be called any number of times before one.
    pub async fn in_progress(&self) -> QueueResult<()> {
        self.acker.in_progress(&self.message_id).await
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("message_id", &self.message_id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// One delivery of one message.
#[derive(Debug)]
pub struct Delivery {
    payload: Arc<[u8]>,
    handle: AckHandle,
}

impl Delivery {
    pub fn new(
        message_id: impl Into<String>,
        payload: impl Into<Arc<[u8]>>,
        attempt: DeliveryAttempt,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        let payload = payload.into();
        Self {
            payload: Arc::clone(&payload),
            handle: AckHandle {
                message_id: message_id.into(),
                payload,
                attempt,
                acker,
            },
        }
    }

    pub fn message_id(&self) -> &str {
        self.handle.message_id()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Transport redelivery counter, 1 on first delivery.
    pub fn attempt(&self) -> DeliveryAttempt {
        self.handle.attempt()
    }

    /// Decode the payload into a job.
    pub fn decode(&self) -> Result<JobDescriptor, DecodeError> {
        JobDescriptor::decode(&self.payload)
    }

    pub fn handle(&self) -> &AckHandle {
        &self.handle
    }

    pub fn into_handle(self) -> AckHandle {
        self.handle
    }
}
