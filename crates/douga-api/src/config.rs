//! API configuration.

use douga_atproto::AtprotoConfig;
use douga_cache::CacheConfig;
use douga_queue::QueueConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Public hostname; the service DID is `did:web:<hostname>`
    pub hostname: String,
    /// AppView base URL (content origin and CORS origin)
    pub appview_url: String,
    /// Frontend URL (CORS origin)
    pub frontend_url: String,
    /// DIDs allowed to upload; empty allows everyone
    pub allowed_dids: Vec<String>,
    /// Max upload body size
    pub max_upload_bytes: usize,
    /// Static daily video allowance
    pub daily_videos: i64,
    /// Static daily byte allowance
    pub daily_bytes: i64,
    /// Environment (development/production)
    pub environment: String,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
    pub cache: CacheConfig,
    pub atproto: AtprotoConfig,
    pub queue: QueueConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            hostname: "video.example.net".to_string(),
            appview_url: String::new(),
            frontend_url: String::new(),
            allowed_dids: Vec::new(),
            max_upload_bytes: 100 * 1024 * 1024, // 100MB
            daily_videos: 2000,
            daily_bytes: 10_000_000,
            environment: "development".to_string(),
            metrics_enabled: true,
            cache: CacheConfig::default(),
            atproto: AtprotoConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            hostname: std::env::var("SERVER_HOSTNAME")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "video.example.net".to_string()),
            appview_url: env_trimmed("APPVIEW_URL"),
            frontend_url: env_trimmed("FRONTEND_URL"),
            allowed_dids: parse_list(&env_trimmed("ALLOWED_DIDS")),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024),
            daily_videos: std::env::var("UPLOAD_DAILY_VIDEOS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2000),
            daily_bytes: std::env::var("UPLOAD_DAILY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000_000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            cache: CacheConfig::from_env(),
            atproto: AtprotoConfig::from_env(),
            queue: QueueConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// DID this service signs as and expects as token audience.
    pub fn service_did(&self) -> String {
        format!("did:web:{}", self.hostname)
    }

    /// Whether `did` may upload.
    pub fn is_allowed(&self, did: &str) -> bool {
        self.allowed_dids.is_empty() || self.allowed_dids.iter().any(|d| d == did)
    }

    /// Origins allowed by CORS.
    pub fn cors_origins(&self) -> Vec<String> {
        [&self.appview_url, &self.frontend_url]
            .into_iter()
            .filter(|o| !o.is_empty())
            .cloned()
            .collect()
    }
}

fn env_trimmed(key: &str) -> String {
    std::env::var(key).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
