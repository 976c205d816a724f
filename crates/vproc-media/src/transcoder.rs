//! Transcode collaborator seam.

use std::path::Path;

use async_trait::async_trait;
use vproc_models::{Advisory, EncodeResult, JobId};

use crate::error::MediaResult;

/// Produces a playable asset, a thumbnail and a duration from a source file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `input` for `job_id`.
    ///
    /// A thumbnail failure is reported as `thumbnail_path: None`, not as an
    /// error.
    async fn encode(&self, input: &Path, job_id: &JobId) -> MediaResult<EncodeResult>;

    /// Remove partial output for `job_id`. Best effort.
    async fn discard_artifacts(&self, job_id: &JobId) -> Advisory;
}
