//! Thumbnail generation.

use std::path::Path;
use std::time::Duration;

use crate::command::{CommandOutput, FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Frame extraction settings.
#[derive(Debug, Clone)]
pub struct ThumbnailOptions {
    /// Position of the extracted frame, in seconds
    pub offset_secs: f64,
    /// Output width; height keeps the aspect ratio
    pub width: u32,
    /// Deadline for the extraction
    pub timeout: Duration,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            offset_secs: 1.0,
            width: 480,
            timeout: Duration::from_secs(120),
        }
    }
}

fn thumbnail_command(video_path: &Path, output_path: &Path, options: &ThumbnailOptions) -> FfmpegCommand {
    FfmpegCommand::new(video_path, output_path)
        .seek(options.offset_secs)
        .single_frame()
        .video_filter(format!("scale={}:-1", options.width))
}

/// Generate a thumbnail from a video file.
pub async fn generate_thumbnail(
    runner: &FfmpegRunner,
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    options: &ThumbnailOptions,
) -> MediaResult<CommandOutput> {
    let cmd = thumbnail_command(video_path.as_ref(), output_path.as_ref(), options);

    runner
        .clone()
        .with_timeout(options.timeout)
        .run(&cmd)
        .await
}
