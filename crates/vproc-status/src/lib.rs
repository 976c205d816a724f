//! Status-tracking service client.
//!
//! The worker reports three things per job: that processing started, that
//! the job is done, and that it failed (getting back a should-retry
//! decision). `StatusReporter` is the seam; `StatusClient` speaks HTTP/JSON.

pub mod client;
pub mod error;
pub mod reporter;
pub mod types;

pub use client::{StatusClient, StatusClientConfig};
pub use error::{StatusError, StatusResult};
pub use reporter::StatusReporter;
pub use types::{CompletionReport, FailureReport, StatusResponse};
