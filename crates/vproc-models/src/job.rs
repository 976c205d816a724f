//! Job payload definitions.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Unique identifier for a job.
///
/// Stable across redeliveries of the same upload; it is the video ID assigned
/// by the upload service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors raised while decoding a queue payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload failed validation: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// One video upload to be transcoded.
///
/// Immutable once received. Unknown fields are ignored; optional display
/// metadata defaults to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JobDescriptor {
    /// Job (video) ID
    #[serde(rename = "video_id")]
    #[validate(custom(function = "validate_job_id"))]
    pub job_id: JobId,
    /// Original file name as uploaded
    #[serde(default)]
    pub file_name: String,
    /// Path of the uploaded source file
    #[validate(length(min = 1, message = "upload_file_path must not be empty"))]
    pub upload_file_path: String,
    /// Container/extension of the original upload
    #[serde(default)]
    pub original_format: String,
    /// Uploader user ID
    #[serde(default)]
    pub uploader_id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Display description
    #[serde(default)]
    pub description: String,
}

impl JobDescriptor {
    /// Create a descriptor with empty display metadata.
    pub fn new(job_id: impl Into<String>, upload_file_path: impl Into<String>) -> Self {
        Self {
            job_id: JobId::from_string(job_id),
            file_name: String::new(),
            upload_file_path: upload_file_path.into(),
            original_format: String::new(),
            uploader_id: String::new(),
            title: String::new(),
            description: String::new(),
        }
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the uploader ID.
    pub fn with_uploader(mut self, uploader_id: impl Into<String>) -> Self {
        self.uploader_id = uploader_id.into();
        self
    }

    /// Decode and validate a raw queue payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let descriptor: Self = serde_json::from_slice(payload)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Encode to the JSON wire format.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// File name component of the upload path.
    ///
    /// Directory components are discarded so the source always resolves
    /// inside the configured input root.
    pub fn source_file_name(&self) -> Option<&str> {
        Path::new(&self.upload_file_path)
            .file_name()
            .and_then(|name| name.to_str())
    }
}

/// Job IDs become directory names, so they must be a single path component.
fn validate_job_id(job_id: &JobId) -> Result<(), ValidationError> {
    let id = job_id.as_str();
    if id.trim().is_empty() {
        return Err(ValidationError::new("empty_job_id"));
    }
    if id == "." || id == ".." || id.contains('/') || id.contains('\\') {
        return Err(ValidationError::new("job_id_not_a_path_component"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "video_id": "v1",
        "file_name": "holiday.mov",
        "upload_file_path": "/data/uploads/abc123.mov",
        "original_format": "mov",
        "uploader_id": "u42",
        "title": "Holiday",
        "description": "Beach day"
    }"#;

    #[test]
    fn test_decode_full_payload() {
        let job = JobDescriptor::decode(PAYLOAD.as_bytes()).unwrap();
        assert_eq!(job.job_id, JobId::from("v1"));
        assert_eq!(job.title, "Holiday");
        assert_eq!(job.uploader_id, "u42");
        assert_eq!(job.source_file_name(), Some("abc123.mov"));
    }

    #[test]
    fn test_decode_defaults_display_metadata() {
        let job =
            JobDescriptor::decode(br#"{"video_id":"v2","upload_file_path":"a.mp4"}"#).unwrap();
        assert!(job.title.is_empty());
        assert!(job.description.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = JobDescriptor::decode(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_missing_job_id() {
        let err = JobDescriptor::decode(br#"{"upload_file_path":"a.mp4"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_empty_fields() {
        let err = JobDescriptor::decode(br#"{"video_id":"","upload_file_path":"a.mp4"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));

        let err =
            JobDescriptor::decode(br#"{"video_id":"v3","upload_file_path":""}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn test_decode_rejects_path_like_job_id() {
        let err = JobDescriptor::decode(br#"{"video_id":"../etc","upload_file_path":"a.mp4"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn test_source_file_name_strips_directories() {
        let job = JobDescriptor::new("v4", "../../secret/clip.mp4");
        assert_eq!(job.source_file_name(), Some("clip.mp4"));
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let job = JobDescriptor::new("v5", "clip.mp4").with_title("T");
        let json: serde_json::Value = serde_json::from_slice(&job.encode().unwrap()).unwrap();
        assert_eq!(json["video_id"], "v5");
        assert_eq!(json["title"], "T");
    }
}
