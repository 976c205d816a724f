//! Result kind for fire-and-log operations.

use std::fmt;

/// Outcome of a best-effort call whose failure must not change control flow.
///
/// Unlike `Result`, an `Advisory` is not `#[must_use]`: callers may log it or
/// drop it. Operations that can alter the job's disposition return `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Advisory {
    failure: Option<String>,
}

impl Advisory {
    /// The call succeeded.
    pub fn ok() -> Self {
        Self { failure: None }
    }

    /// The call failed; the error is kept only for logging.
    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            failure: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    /// Failure message, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

impl<E: fmt::Display> From<Result<(), E>> for Advisory {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e),
        }
    }
}
