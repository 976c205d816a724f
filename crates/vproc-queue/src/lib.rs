//! Redis Streams delivery layer.
//!
//! This crate provides:
//! - Stream and consumer group provisioning
//! - At-least-once consumption with a bounded delivery count
//! - One-shot ack / nack / terminate handles with a dead-letter stream
//! - The ack/redelivery policy applied to each processed delivery

pub mod delivery;
pub mod error;
pub mod policy;
pub mod queue;

pub use delivery::{Acknowledger, AckHandle, Delivery};
pub use error::{QueueError, QueueResult};
pub use policy::{AckAction, ClaimDecision, DeliveryPolicy};
pub use queue::{JobQueue, QueueConfig};
