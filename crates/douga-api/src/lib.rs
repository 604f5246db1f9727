//! Axum HTTP API server.
//!
//! This crate provides:
//! - The `app.bsky.video` XRPC endpoints (upload, job status, upload limits)
//! - HLS playlist, segment and thumbnail serving under `/watch`
//! - Service-auth token verification
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, AuthVerifier, ServiceAuthVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
