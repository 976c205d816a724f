//! FFmpeg-backed HLS encoder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use vproc_models::{Advisory, EncodeResult, JobId};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::duration::{read_duration, whole_seconds};
use crate::thumbnail::generate_thumbnail;
use crate::transcoder::Transcoder;

/// Playlist file name inside the per-job HLS directory.
pub const PLAYLIST_NAME: &str = "playlist.m3u8";
/// Segment name pattern inside the per-job HLS directory.
pub const SEGMENT_PATTERN: &str = "seg_%03d.ts";
/// Thumbnail file name inside the per-job thumbnail directory.
pub const THUMBNAIL_NAME: &str = "thumbnail.jpg";

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(60);

/// HLS encoding parameters and output roots.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub hls_root: PathBuf,
    pub thumbnail_root: PathBuf,
    /// Target segment length in seconds
    pub hls_time: u32,
    pub preset: String,
    pub crf: u8,
    /// Upper bound for one encode
    pub timeout: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            hls_root: PathBuf::from("./outputs/hls"),
            thumbnail_root: PathBuf::from("./outputs/thumbnails"),
            hls_time: 10,
            preset: "medium".to_string(),
            crf: 23,
            timeout: Duration::from_secs(3600),
        }
    }
}

impl EncoderConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hls_root: std::env::var("OUTPUT_HLS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.hls_root),
            thumbnail_root: std::env::var("OUTPUT_THUMBNAIL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.thumbnail_root),
            hls_time: std::env::var("FFMPEG_HLS_TIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hls_time),
            preset: std::env::var("FFMPEG_PRESET").unwrap_or(defaults.preset),
            crf: std::env::var("FFMPEG_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            timeout: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Per-job HLS output directory.
    pub fn hls_dir(&self, job_id: &JobId) -> PathBuf {
        self.hls_root.join(job_id.as_str())
    }

    /// Per-job thumbnail output directory.
    pub fn thumbnail_dir(&self, job_id: &JobId) -> PathBuf {
        self.thumbnail_root.join(job_id.as_str())
    }
}

/// Transcodes a source file into an HLS VOD playlist plus thumbnail.
#[derive(Debug, Clone)]
pub struct HlsEncoder {
    config: EncoderConfig,
    runner: FfmpegRunner,
}

impl HlsEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        let runner = FfmpegRunner::new().with_timeout(config.timeout);
        Self { config, runner }
    }

    pub fn from_env() -> Self {
        Self::new(EncoderConfig::from_env())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn hls_command(&self, input: &Path, out_dir: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, out_dir.join(PLAYLIST_NAME))
            .video_codec("libx264")
            .preset(self.config.preset.clone())
            .crf(self.config.crf)
            .audio_codec("aac")
            .audio_bitrate("128k")
            .output_args([
                "-hls_time".to_string(),
                self.config.hls_time.to_string(),
                "-hls_playlist_type".to_string(),
                "vod".to_string(),
                "-hls_segment_filename".to_string(),
                out_dir.join(SEGMENT_PATTERN).to_string_lossy().to_string(),
            ])
            .format("hls")
    }
}

#[async_trait]
impl Transcoder for HlsEncoder {
    async fn encode(&self, input: &Path, job_id: &JobId) -> MediaResult<EncodeResult> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        let out_dir = self.config.hls_dir(job_id);
        tokio::fs::create_dir_all(&out_dir).await?;

        info!(job_id = %job_id, input = %input.display(), "Starting HLS encode");
        self.runner.run(&self.hls_command(input, &out_dir)).await?;

        let playlist = out_dir.join(PLAYLIST_NAME);
        let mut result = EncodeResult::new(playlist.to_string_lossy());

        match read_duration(input).await {
            Ok(duration) => result = result.with_duration(whole_seconds(duration)),
            Err(e) => warn!(job_id = %job_id, "Duration lookup failed, reporting 0: {}", e),
        }

        let thumb_dir = self.config.thumbnail_dir(job_id);
        let thumb_path = thumb_dir.join(THUMBNAIL_NAME);
        let thumbnail = async {
            tokio::fs::create_dir_all(&thumb_dir).await?;
            generate_thumbnail(input, &thumb_path, THUMBNAIL_TIMEOUT).await
        };
        match thumbnail.await {
            Ok(()) => result = result.with_thumbnail(thumb_path.to_string_lossy()),
            Err(e) => warn!(job_id = %job_id, "Thumbnail generation failed: {}", e),
        }

        info!(
            job_id = %job_id,
            stream_path = %result.stream_path,
            duration_secs = result.duration_secs,
            "HLS encode complete"
        );
        Ok(result)
    }

    async fn discard_artifacts(&self, job_id: &JobId) -> Advisory {
        let mut failures = Vec::new();
        for dir in [self.config.hls_dir(job_id), self.config.thumbnail_dir(job_id)] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => failures.push(format!("{}: {}", dir.display(), e)),
            }
        }

        if failures.is_empty() {
            Advisory::ok()
        } else {
            Advisory::failed(failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn encoder_in(tmp: &TempDir) -> HlsEncoder {
        HlsEncoder::new(EncoderConfig {
            hls_root: tmp.path().join("hls"),
            thumbnail_root: tmp.path().join("thumbs"),
            ..EncoderConfig::default()
        })
    }

    #[test]
    fn test_per_job_directories() {
        let config = EncoderConfig {
            hls_root: PathBuf::from("/out/hls"),
            thumbnail_root: PathBuf::from("/out/thumbs"),
            ..EncoderConfig::default()
        };
        let id = JobId::from("v1");
        assert_eq!(config.hls_dir(&id), PathBuf::from("/out/hls/v1"));
        assert_eq!(config.thumbnail_dir(&id), PathBuf::from("/out/thumbs/v1"));
    }

    #[test]
    fn test_hls_command_arguments() {
        let tmp = TempDir::new().unwrap();
        let encoder = encoder_in(&tmp);
        let out_dir = tmp.path().join("hls/v1");
        let args = encoder.hls_command(Path::new("in.mp4"), &out_dir).build_args();

        let value_of = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };
        assert_eq!(value_of("-c:v"), "libx264");
        assert_eq!(value_of("-preset"), "medium");
        assert_eq!(value_of("-crf"), "23");
        assert_eq!(value_of("-hls_time"), "10");
        assert_eq!(value_of("-hls_playlist_type"), "vod");
        assert_eq!(value_of("-f"), "hls");
        assert!(value_of("-hls_segment_filename").ends_with(SEGMENT_PATTERN));
        assert!(args.last().unwrap().ends_with(PLAYLIST_NAME));
    }

    #[tokio::test]
    async fn test_encode_missing_input() {
        let tmp = TempDir::new().unwrap();
        let encoder = encoder_in(&tmp);
        let err = encoder
            .encode(&tmp.path().join("missing.mp4"), &JobId::from("v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(!tmp.path().join("hls/v1").exists());
    }

    #[tokio::test]
    async fn test_discard_removes_job_directories() {
        let tmp = TempDir::new().unwrap();
        let encoder = encoder_in(&tmp);
        let id = JobId::from("v1");
        let other = JobId::from("v2");

        for dir in [
            encoder.config().hls_dir(&id),
            encoder.config().thumbnail_dir(&id),
            encoder.config().hls_dir(&other),
        ] {
            tokio::fs::create_dir_all(&dir).await.unwrap();
            tokio::fs::write(dir.join("seg_000.ts"), b"data").await.unwrap();
        }

        assert!(encoder.discard_artifacts(&id).await.is_ok());
        assert!(!encoder.config().hls_dir(&id).exists());
        assert!(!encoder.config().thumbnail_dir(&id).exists());
        assert!(encoder.config().hls_dir(&other).exists());
    }

    #[tokio::test]
    async fn test_discard_without_output_is_ok() {
        let tmp = TempDir::new().unwrap();
        let encoder = encoder_in(&tmp);
        assert!(encoder.discard_artifacts(&JobId::from("never")).await.is_ok());
    }
}
