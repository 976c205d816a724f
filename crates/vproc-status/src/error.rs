//! Status client error types.

use thiserror::Error;

pub type StatusResult<T> = Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Status service returned {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Status service rejected the call: {0}")]
    Rejected(String),

    #[error("Invalid status service URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
