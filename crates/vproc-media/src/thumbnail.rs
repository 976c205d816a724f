//! Thumbnail generation.

use std::path::Path;
use std::time::Duration;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Timestamp of the frame used for the thumbnail.
pub const THUMBNAIL_TIMESTAMP: &str = "00:00:05";

/// Fit inside 1280x720 without changing aspect ratio.
pub const THUMBNAIL_FILTER: &str = "scale=1280:720:force_original_aspect_ratio=decrease";

/// Generate a JPEG thumbnail from a video file.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<()> {
    let cmd = thumbnail_command(video_path.as_ref(), output_path.as_ref());
    FfmpegRunner::new().with_timeout(timeout).run(&cmd).await
}

fn thumbnail_command(video_path: &Path, output_path: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video_path, output_path)
        .seek_to(THUMBNAIL_TIMESTAMP)
        .single_frame()
        .video_filter(THUMBNAIL_FILTER)
        .output_arg("-q:v")
        .output_arg("2")
        .log_level("error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_command() {
        let args = thumbnail_command(Path::new("in.mp4"), Path::new("thumb.jpg")).build_args();
        assert!(args.contains(&THUMBNAIL_TIMESTAMP.to_string()));
        assert!(args.contains(&THUMBNAIL_FILTER.to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-vframes" && w[1] == "1"));
    }
}
