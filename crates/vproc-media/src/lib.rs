//! FFmpeg CLI wrapper for HLS transcoding.
//!
//! This crate provides:
//! - The `Transcoder` seam used by the job controller
//! - An FFmpeg command builder and runner with a timeout
//! - Container duration via FFprobe
//! - Thumbnail extraction
//! - `HlsEncoder`, the FFmpeg-backed `Transcoder`

pub mod command;
pub mod duration;
pub mod encoder;
pub mod error;
pub mod thumbnail;
pub mod transcoder;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use duration::{read_duration, whole_seconds};
pub use encoder::{EncoderConfig, HlsEncoder};
pub use error::{MediaError, MediaResult};
pub use thumbnail::generate_thumbnail;
pub use transcoder::Transcoder;
