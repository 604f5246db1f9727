//! API error types.
//!
//! Errors render as XRPC error bodies: `{"error": <Name>, "message": <text>}`.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use douga_cache::CacheError;
use douga_models::ValidationError;
use douga_queue::QueueError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A derivation for the requested artifact is still running.
    #[error("artifact is still being generated")]
    NotReady { retry_after: Duration },

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Cache(CacheError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Cache(CacheError::FileNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Queue(QueueError::JobNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Cache(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// XRPC error name.
    pub fn error_name(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "InvalidRequest",
            StatusCode::UNAUTHORIZED => "AuthenticationRequired",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "NotFound",
            StatusCode::SERVICE_UNAVAILABLE => "NotReady",
            _ => "InternalServerError",
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

/// Marks a response rendered from an internal error.
#[derive(Debug, Clone, Copy)]
struct InternalError(&'static str);

const REDACTED_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_internal() {
            tracing::error!(status = %status, "Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.error_name(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if self.is_internal() {
            response.extensions_mut().insert(InternalError(self.error_name()));
        }

        if let ApiError::NotReady { retry_after } = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }

        response
    }
}

/// Replace the message of an internal error response with a generic one.
///
/// Other responses pass through untouched.
pub(crate) fn redact_internal(response: Response) -> Response {
    match response.extensions().get::<InternalError>().copied() {
        Some(InternalError(name)) => {
            let body = ErrorResponse {
                error: name,
                message: REDACTED_MESSAGE.to_string(),
            };
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}
