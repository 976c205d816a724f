//! Transcode output bundle.

use serde::{Deserialize, Serialize};

/// Output of one successful transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeResult {
    /// Playable stream (HLS playlist) path
    pub stream_path: String,
    /// Thumbnail path; `None` when only the thumbnail step failed
    pub thumbnail_path: Option<String>,
    /// Duration in whole seconds, 0 if unknown
    pub duration_secs: u64,
}

impl EncodeResult {
    pub fn new(stream_path: impl Into<String>) -> Self {
        Self {
            stream_path: stream_path.into(),
            thumbnail_path: None,
            duration_secs: 0,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_path: impl Into<String>) -> Self {
        self.thumbnail_path = Some(thumbnail_path.into());
        self
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }
}
