//! XRPC response views for the `app.bsky.video` endpoints.

use serde::{Deserialize, Serialize};

use crate::blob::BlobRef;
use crate::job::JobState;

/// `app.bsky.video.defs#jobStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub did: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `app.bsky.video.getJobStatus` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusOutput {
    pub job_status: JobStatusView,
}

/// `app.bsky.video.getUploadLimits` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLimits {
    pub can_upload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_daily_videos: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_daily_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadLimits {
    /// A full static allowance.
    pub fn allowed(videos: i64, bytes: i64) -> Self {
        Self {
            can_upload: true,
            remaining_daily_videos: Some(videos),
            remaining_daily_bytes: Some(bytes),
            message: None,
            error: None,
        }
    }

    /// Zero allowance for subjects outside the allow-list.
    pub fn denied() -> Self {
        Self {
            can_upload: false,
            remaining_daily_videos: Some(0),
            remaining_daily_bytes: Some(0),
            message: None,
            error: None,
        }
    }
}
