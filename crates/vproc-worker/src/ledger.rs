//! Process-local retry ledger.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use vproc_models::JobId;

/// Failure counts per job, as observed by this process since it started.
///
/// This is a local observation, not the job's global retry history: it is
/// empty after a restart, while the transport's delivery counter keeps
/// counting. An entry exists only for a job that failed at least once here
/// and was not yet declared permanently failed.
#[derive(Debug, Default)]
pub struct RetryLedger {
    counts: Mutex<HashMap<JobId, u32>>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<JobId, u32>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one failure and return the count from before it.
    pub fn record_failure(&self, job_id: &JobId) -> u32 {
        let mut counts = self.counts();
        let count = counts.entry(job_id.clone()).or_insert(0);
        let previous = *count;
        *count = previous.saturating_add(1);
        previous
    }

    /// Recorded failures for a job; `None` when there is no entry.
    pub fn count(&self, job_id: &JobId) -> Option<u32> {
        self.counts().get(job_id).copied()
    }

    /// Drop the entry for a job declared permanently failed.
    pub fn clear(&self, job_id: &JobId) -> Option<u32> {
        self.counts().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.counts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts().is_empty()
    }
}
