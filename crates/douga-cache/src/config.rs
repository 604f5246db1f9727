//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use douga_media::{HlsOptions, ThumbnailOptions};

/// Artifact cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Ephemeral-storage root for artifact directories and scratch blobs
    pub root_dir: PathBuf,
    /// Idle time after which an entry is reclaimed
    pub ttl: Duration,
    /// How often the sweeper scans the table
    pub sweep_interval: Duration,
    /// Base URL of the content origin (`{origin}/blob/{did}/{cid}`)
    pub origin_url: String,
    /// Deadline for downloading one source blob
    pub origin_timeout: Duration,
    /// HLS segment duration in seconds
    pub segment_secs: u32,
    /// Thumbnail frame position in seconds
    pub thumbnail_offset_secs: f64,
    /// Thumbnail width in pixels
    pub thumbnail_width: u32,
    /// Deadline per transcoder invocation
    pub ffmpeg_timeout: Duration,
    /// How long a late joiner waits on an in-flight derivation
    pub join_wait: Duration,
    /// Poll hint handed to late joiners that gave up waiting
    pub retry_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: std::env::temp_dir().join("douga"),
            ttl: Duration::from_secs(1800), // 30 minutes
            sweep_interval: Duration::from_secs(300),
            origin_url: String::new(),
            origin_timeout: Duration::from_secs(300),
            segment_secs: 10,
            thumbnail_offset_secs: 1.0,
            thumbnail_width: 480,
            ffmpeg_timeout: Duration::from_secs(600),
            join_wait: Duration::from_millis(2000),
            retry_after: Duration::from_secs(2),
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            root_dir: std::env::var("CACHE_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.root_dir),
            ttl: Duration::from_secs(
                std::env::var("CACHE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("CACHE_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(300),
            ),
            origin_url: std::env::var("APPVIEW_URL").unwrap_or_default(),
            origin_timeout: Duration::from_secs(
                std::env::var("ORIGIN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            segment_secs: std::env::var("HLS_SEGMENT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            thumbnail_offset_secs: std::env::var("THUMBNAIL_OFFSET_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            thumbnail_width: std::env::var("THUMBNAIL_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(480),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            join_wait: Duration::from_millis(
                std::env::var("DERIVE_JOIN_WAIT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            retry_after: Duration::from_secs(
                std::env::var("DERIVE_RETRY_AFTER_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            ),
        }
    }

    pub fn hls_options(&self) -> HlsOptions {
        HlsOptions {
            segment_secs: self.segment_secs,
            timeout: self.ffmpeg_timeout,
        }
    }

    pub fn thumbnail_options(&self) -> ThumbnailOptions {
        ThumbnailOptions {
            offset_secs: self.thumbnail_offset_secs,
            width: self.thumbnail_width,
            timeout: self.ffmpeg_timeout,
        }
    }
}
