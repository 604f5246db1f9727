//! Queue configuration.

use std::time::Duration;

/// Job retention settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a terminal job stays queryable
    pub retention: Duration,
    /// How often the reaper scans the registry
    pub reap_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600), // 1 hour
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            retention: Duration::from_secs(
                std::env::var("JOB_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            reap_interval: Duration::from_secs(
                std::env::var("JOB_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(60),
            ),
        }
    }
}
