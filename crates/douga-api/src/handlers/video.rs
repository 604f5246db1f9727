//! `app.bsky.video` XRPC handlers.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use bytes::Bytes;
use douga_models::{JobId, JobStatusOutput, JobStatusView, UploadLimits};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadVideoQuery {
    pub did: Option<String>,
    /// Client-chosen file name; accepted and ignored.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusQuery {
    pub job_id: Option<String>,
}

/// `POST /xrpc/app.bsky.video.uploadVideo?did=<did>`.
///
/// Registers a job and returns it immediately; the blob is relayed to the
/// owner's PDS in the background using the request's own credentials.
pub async fn upload_video(
    State(state): State<AppState>,
    Query(query): Query<UploadVideoQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<JobStatusView>> {
    let did = query
        .did
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::bad_request("did is missing"))?;

    if !state.config.is_allowed(&did) {
        warn!(did = %did, "Upload from DID outside the allow-list");
        return Err(ApiError::forbidden("DID not allowed"));
    }

    let authorization = header_string(&headers, header::AUTHORIZATION.as_str());
    let content_type = header_string(&headers, header::CONTENT_TYPE.as_str());

    info!(did = %did, bytes = body.len(), name = ?query.name, "Accepted video upload");
    metrics::record_upload_bytes(body.len());

    let job = state
        .jobs
        .create(did, authorization, content_type, body)
        .await;

    Ok(Json(job.to_view()))
}

/// `GET /xrpc/app.bsky.video.getJobStatus?jobId=<id>`.
pub async fn get_job_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<JobStatusQuery>,
) -> ApiResult<Json<JobStatusOutput>> {
    let job_id = query
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("jobId is missing"))?;

    let job = state.jobs.get_status(&JobId::from_string(job_id)).await?;

    Ok(Json(JobStatusOutput {
        job_status: job.to_view(),
    }))
}

/// `GET /xrpc/app.bsky.video.getUploadLimits`.
pub async fn get_upload_limits(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<UploadLimits> {
    let config = &state.config;

    if config.is_allowed(&user.did) {
        Json(UploadLimits::allowed(config.daily_videos, config.daily_bytes))
    } else {
        Json(UploadLimits::denied())
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
