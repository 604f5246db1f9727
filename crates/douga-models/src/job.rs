//! Upload job definitions.
//!
//! A job tracks one upload-and-relay operation. The lifecycle is
//! `processing -> completed | failed`; terminal states are final and every
//! mutation after one is rejected with [`TransitionError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::blob::BlobRef;
use crate::xrpc::JobStatusView;

/// Progress reported for a job that has been accepted but not yet started.
pub const INITIAL_PROGRESS: u8 = 1;

/// Progress reported once the owner's storage endpoint is known.
pub const RESOLVED_PROGRESS: u8 = 10;

/// Unique, unguessable identifier for an upload job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle state.
///
/// Wire names follow `app.bsky.video.defs#jobStatus`: terminal states use the
/// lexicon's known values, anything else is read as "still processing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobState {
    /// Upload accepted, relay in flight
    #[default]
    #[serde(rename = "processing")]
    Processing,
    /// Storage endpoint accepted the blob
    #[serde(rename = "JOB_STATE_COMPLETED")]
    Completed,
    /// Relay failed, error retained on the job
    #[serde(rename = "JOB_STATE_FAILED")]
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Processing => "processing",
            JobState::Completed => "JOB_STATE_COMPLETED",
            JobState::Failed => "JOB_STATE_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected job mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {state}")]
    AlreadyTerminal { job_id: JobId, state: JobState },
}

/// An upload-and-relay job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// DID of the uploading user
    pub owner: String,

    /// Lifecycle state
    pub state: JobState,

    /// Advisory progress (0-100), never decreases
    pub progress: u8,

    /// Stored blob reference (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobRef>,

    /// Human-readable failure (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a freshly accepted job in `processing` at the initial progress.
    pub fn new(owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner: owner.into(),
            state: JobState::Processing,
            progress: INITIAL_PROGRESS,
            blob: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                job_id: self.id.clone(),
                state: self.state,
            });
        }
        Ok(())
    }

    /// Raise progress. Lower values than the current one are ignored.
    pub fn advance(&mut self, progress: u8) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark job as completed with the stored blob.
    pub fn complete(&mut self, blob: BlobRef) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let now = Utc::now();
        self.state = JobState::Completed;
        self.progress = 100;
        self.blob = Some(blob);
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Mark job as failed. Progress stays where the relay stopped.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let now = Utc::now();
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Render the `app.bsky.video.defs#jobStatus` view.
    pub fn to_view(&self) -> JobStatusView {
        let message = match self.state {
            JobState::Processing => "processing...".to_string(),
            JobState::Completed => "uploaded!".to_string(),
            JobState::Failed => self.error.clone().unwrap_or_default(),
        };

        JobStatusView {
            job_id: self.id.to_string(),
            did: self.owner.clone(),
            state: self.state,
            progress: Some(self.progress),
            message: Some(message),
            blob: self.blob.clone(),
            error: match self.state {
                JobState::Failed => self.error.clone(),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> BlobRef {
        BlobRef::new("bafy123", "video/mp4", 42)
    }

    #[test]
    fn test_job_creation() {
        let job = Job::new("did:example:abc");

        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.progress, INITIAL_PROGRESS);
        assert!(!job.is_terminal());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::new().as_str().len(), 32);
    }

    #[test]
    fn test_job_completes() {
        let mut job = Job::new("did:example:abc");
        job.advance(RESOLVED_PROGRESS).unwrap();
        job.complete(blob()).unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.blob.as_ref().map(|b| b.cid()), Some("bafy123"));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = Job::new("did:example:abc");
        job.advance(50).unwrap();
        job.advance(10).unwrap();
        assert_eq!(job.progress, 50);

        job.advance(250).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut failed = Job::new("did:example:abc");
        failed.fail("user has no PDS").unwrap();

        assert!(matches!(
            failed.complete(blob()),
            Err(TransitionError::AlreadyTerminal { state: JobState::Failed, .. })
        ));
        assert!(failed.advance(90).is_err());
        assert!(failed.fail("again").is_err());
        assert_eq!(failed.error.as_deref(), Some("user has no PDS"));
        assert_eq!(failed.progress, INITIAL_PROGRESS);

        let mut completed = Job::new("did:example:abc");
        completed.complete(blob()).unwrap();
        assert!(completed.fail("late").is_err());
        assert_eq!(completed.state, JobState::Completed);
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(serde_json::to_string(&JobState::Processing).unwrap(), "\"processing\"");
        assert_eq!(
            serde_json::to_string(&JobState::Completed).unwrap(),
            "\"JOB_STATE_COMPLETED\""
        );
        assert_eq!(serde_json::to_string(&JobState::Failed).unwrap(), "\"JOB_STATE_FAILED\"");
    }

    #[test]
    fn test_view_messages() {
        let mut job = Job::new("did:example:abc");
        assert_eq!(job.to_view().message.as_deref(), Some("processing..."));
        assert!(job.to_view().error.is_none());

        job.fail("upload error 500").unwrap();
        let view = job.to_view();
        assert_eq!(view.message.as_deref(), Some("upload error 500"));
        assert_eq!(view.error.as_deref(), Some("upload error 500"));
        assert!(view.blob.is_none());
    }
}
