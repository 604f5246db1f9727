//! Derivation workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use douga_media::{
    generate_thumbnail, segment_to_hls, FfmpegRunner, HlsOptions, ThumbnailOptions,
};
use douga_models::{ArtifactKey, ArtifactKind};
use tracing::debug;

use crate::error::CacheResult;
use crate::source::BlobSource;

/// Populates an entry's directory for a key.
///
/// Implementations must tolerate being re-run on a directory left behind by
/// a failed attempt.
#[async_trait]
pub trait Deriver: Send + Sync {
    async fn derive(&self, key: &ArtifactKey, output_dir: &Path) -> CacheResult<()>;
}

/// Downloads the source blob to a scratch file and runs FFmpeg on it.
pub struct FfmpegDeriver {
    source: Arc<dyn BlobSource>,
    scratch_dir: PathBuf,
    runner: FfmpegRunner,
    hls: HlsOptions,
    thumbnail: ThumbnailOptions,
}

impl FfmpegDeriver {
    pub fn new(
        source: Arc<dyn BlobSource>,
        scratch_dir: impl Into<PathBuf>,
        hls: HlsOptions,
        thumbnail: ThumbnailOptions,
    ) -> Self {
        Self {
            source,
            scratch_dir: scratch_dir.into(),
            runner: FfmpegRunner::new(),
            hls,
            thumbnail,
        }
    }

    /// Run a different transcoder than the `ffmpeg` on PATH.
    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }
}

#[async_trait]
impl Deriver for FfmpegDeriver {
    async fn derive(&self, key: &ArtifactKey, output_dir: &Path) -> CacheResult<()> {
        clear_dir(output_dir).await?;

        // Removed on drop, whichever way this function returns.
        let scratch = tempfile::Builder::new()
            .prefix("blob_")
            .tempfile_in(&self.scratch_dir)?;

        self.source
            .fetch_to(key.subject(), key.content_id(), scratch.path())
            .await?;

        let output = match key.kind() {
            ArtifactKind::PlaylistBundle => {
                segment_to_hls(&self.runner, scratch.path(), output_dir, &self.hls).await?
            }
            ArtifactKind::Thumbnail => {
                let target = output_dir.join(key.kind().primary_file());
                generate_thumbnail(&self.runner, scratch.path(), target, &self.thumbnail).await?
            }
        };

        debug!(
            key = %key,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Transcoder finished"
        );
        Ok(())
    }
}

/// Remove partial output from an earlier attempt.
async fn clear_dir(dir: &Path) -> CacheResult<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    struct StaticSource(Result<&'static [u8], &'static str>);

    #[async_trait]
    impl BlobSource for StaticSource {
        async fn fetch_to(&self, _subject: &str, _cid: &str, dest: &Path) -> CacheResult<u64> {
            match self.0 {
                Ok(bytes) => {
                    tokio::fs::write(dest, bytes).await?;
                    Ok(bytes.len() as u64)
                }
                Err(msg) => Err(CacheError::source_failed(msg)),
            }
        }
    }

    fn blob_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("blob_"))
            .count()
    }

    fn deriver(source: StaticSource, scratch: &Path) -> FfmpegDeriver {
        FfmpegDeriver::new(
            Arc::new(source),
            scratch,
            HlsOptions::default(),
            ThumbnailOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_download_failure_removes_scratch_file() {
        let scratch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let key = ArtifactKey::new("did:plc:abc", "bafy123", ArtifactKind::Thumbnail).unwrap();

        let err = deriver(StaticSource(Err("HTTP 404 Not Found")), scratch.path())
            .derive(&key, out.path())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to download blob: HTTP 404 Not Found");
        assert_eq!(blob_files(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_transcoder_failure_removes_scratch_and_stale_output() {
        let scratch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(out.path().join("segment0.ts"), b"stale").unwrap();
        let key = ArtifactKey::new("did:plc:abc", "bafy123", ArtifactKind::PlaylistBundle).unwrap();

        // Garbage input fails whether or not ffmpeg is installed.
        let result = deriver(StaticSource(Ok(b"not a video")), scratch.path())
            .derive(&key, out.path())
            .await;

        assert!(matches!(result, Err(CacheError::Media(_))));
        assert_eq!(blob_files(scratch.path()), 0);
        assert!(!out.path().join("segment0.ts").exists());
    }

    /// Stand-in transcoder that copies its `-i` input to its last argument.
    #[cfg(unix)]
    fn copying_transcoder(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             while [ \"$#\" -gt 1 ]; do\n\
               if [ \"$1\" = \"-i\" ]; then input=\"$2\"; fi\n\
               shift\n\
             done\n\
             cp \"$input\" \"$1\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_thumbnail_written_and_scratch_removed() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(out.path().join("stale.jpg"), b"old").unwrap();
        let key = ArtifactKey::new("did:plc:abc", "bafy123", ArtifactKind::Thumbnail).unwrap();

        let runner = FfmpegRunner::new().with_program(copying_transcoder(bin.path()));
        deriver(StaticSource(Ok(b"fake video")), scratch.path())
            .with_runner(runner)
            .derive(&key, out.path())
            .await
            .unwrap();

        let thumbnail = std::fs::read(out.path().join("thumbnail.jpg")).unwrap();
        assert_eq!(thumbnail, b"fake video");
        assert!(!out.path().join("stale.jpg").exists());
        assert_eq!(blob_files(scratch.path()), 0);
    }
}
