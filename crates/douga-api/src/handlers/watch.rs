//! HLS playlist, segment and thumbnail serving.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use douga_cache::Fetch;
use douga_models::{ArtifactFile, ArtifactKey};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Thumbnails for a given CID never change.
const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=31536000";

/// `GET /watch/:did/:cid/*file`.
///
/// The file name is checked against the artifact grammar before anything
/// touches the cache or the filesystem. The first request for a slot derives
/// it; concurrent requests join that derivation.
pub async fn watch_artifact(
    State(state): State<AppState>,
    Path((did, cid, file)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let file = ArtifactFile::parse(&file)?;
    let kind = file.kind();
    let key = ArtifactKey::new(did, cid, kind)?;

    let lease = match state.cache.fetch(key).await? {
        Fetch::Ready(lease) => lease,
        Fetch::Pending { retry_after } => {
            metrics::record_artifact_not_ready(kind.as_str());
            return Err(ApiError::NotReady { retry_after });
        }
    };

    let body = lease.read(&file).await?;
    drop(lease);

    debug!(file = %file.file_name(), bytes = body.len(), "Serving artifact");
    metrics::record_artifact_served(kind.as_str(), body.len());

    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static(file.content_type()))],
        body,
    )
        .into_response();

    if matches!(file, ArtifactFile::Thumbnail) {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL),
        );
    }

    Ok(response)
}
