//! HLS segmentation.

use std::path::Path;
use std::time::Duration;

use douga_models::artifact::{PLAYLIST_FILE, SEGMENT_EXTENSION, SEGMENT_PREFIX};

use crate::command::{CommandOutput, FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Segmenter settings.
#[derive(Debug, Clone)]
pub struct HlsOptions {
    /// Target segment duration in seconds
    pub segment_secs: u32,
    /// Deadline for the whole transcode
    pub timeout: Duration,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            segment_secs: 10,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Build the segmenter command writing `playlist.m3u8` and `segment%d.ts`
/// into `output_dir`.
pub fn hls_command(input: &Path, output_dir: &Path, options: &HlsOptions) -> FfmpegCommand {
    let segment_pattern = output_dir.join(format!("{}%d{}", SEGMENT_PREFIX, SEGMENT_EXTENSION));

    FfmpegCommand::new(input, output_dir.join(PLAYLIST_FILE)).output_args([
        "-profile:v".to_string(),
        "baseline".to_string(),
        "-level".to_string(),
        "3.0".to_string(),
        "-start_number".to_string(),
        "0".to_string(),
        "-hls_time".to_string(),
        options.segment_secs.to_string(),
        "-hls_list_size".to_string(),
        "0".to_string(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_segment_filename".to_string(),
        segment_pattern.to_string_lossy().to_string(),
    ])
}

/// Transcode `input` into an HLS playlist bundle inside `output_dir`.
///
/// `runner` picks the transcoder binary; the deadline comes from `options`.
pub async fn segment_to_hls(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &HlsOptions,
) -> MediaResult<CommandOutput> {
    let cmd = hls_command(input.as_ref(), output_dir.as_ref(), options);

    runner
        .clone()
        .with_timeout(options.timeout)
        .run(&cmd)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hls_arguments() {
        let options = HlsOptions {
            segment_secs: 6,
            ..Default::default()
        };
        let cmd = hls_command(Path::new("/tmp/blob_1"), Path::new("/cache/hls_x"), &options);
        let args = cmd.build_args();

        let hls_time = args.iter().position(|a| a == "-hls_time").unwrap();
        assert_eq!(args[hls_time + 1], "6");
        let pattern = args.iter().position(|a| a == "-hls_segment_filename").unwrap();
        assert_eq!(args[pattern + 1], "/cache/hls_x/segment%d.ts");
        assert_eq!(args.last().unwrap(), "/cache/hls_x/playlist.m3u8");
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "hls"));
    }
}
