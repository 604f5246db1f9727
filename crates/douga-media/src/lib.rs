//! FFmpeg CLI wrapper for video derivation.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with a hard deadline, forced kill on expiry and combined
//!   stdout/stderr capture for diagnostics
//! - HLS segmentation and thumbnail extraction

pub mod command;
pub mod error;
pub mod hls;
pub mod thumbnail;

pub use command::{check_ffmpeg, CommandOutput, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use hls::{hls_command, segment_to_hls, HlsOptions};
pub use thumbnail::{generate_thumbnail, ThumbnailOptions};
