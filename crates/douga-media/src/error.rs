//! Error types for media operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running the transcoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffmpeg error: exit status {}, output: {output}", exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    FfmpegFailed {
        output: String,
        exit_code: Option<i32>,
    },

    #[error("ffmpeg finished but {0} was not written")]
    MissingOutput(PathBuf),

    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            output: output.into(),
            exit_code,
        }
    }
}
