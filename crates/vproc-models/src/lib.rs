//! Shared data models for the video processing worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job payloads as they arrive on the upload stream
//! - Transcode output bundles
//! - Per-delivery outcomes and failure codes

pub mod advisory;
pub mod encode;
pub mod job;
pub mod outcome;

// Re-export common types
pub use advisory::Advisory;
pub use encode::EncodeResult;
pub use job::{DecodeError, JobDescriptor, JobId};
pub use outcome::{DeliveryAttempt, ErrorCode, JobFailure, Outcome};
