//! Video upload worker.
//!
//! Consumes upload events from the job queue, drives each job through the
//! transcoder and the status service, and decides per delivery whether to
//! ack, nack or terminate.

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod retry;

pub use config::WorkerConfig;
pub use controller::{ControllerConfig, JobController};
pub use dispatcher::Dispatcher;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use ledger::RetryLedger;
pub use logging::JobLogger;
pub use retry::{linear_backoff, retry_async, retry_with_backoff, RetryConfig, RetryResult};
