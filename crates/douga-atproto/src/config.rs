//! Protocol client configuration.

use std::time::Duration;

/// Configuration for the identity resolver and PDS client.
#[derive(Debug, Clone)]
pub struct AtprotoConfig {
    /// PLC directory base URL
    pub plc_url: String,
    /// Deadline for one DID document fetch
    pub resolve_timeout: Duration,
    /// Deadline for one blob relay
    pub relay_timeout: Duration,
}

impl Default for AtprotoConfig {
    fn default() -> Self {
        Self {
            plc_url: "https://plc.directory".to_string(),
            resolve_timeout: Duration::from_secs(10),
            relay_timeout: Duration::from_secs(300), // 5 minutes for large videos
        }
    }
}

impl AtprotoConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            plc_url: std::env::var("ATPROTO_PLC_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://plc.directory".to_string()),
            resolve_timeout: Duration::from_secs(
                std::env::var("RESOLVE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            relay_timeout: Duration::from_secs(
                std::env::var("RELAY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}
