//! In-memory job table.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use douga_models::{BlobRef, Job, JobId, TransitionError};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Keyed table of upload jobs.
///
/// Readers get snapshots. Each job is written only by the worker relaying it,
/// and every write goes through [`Job`]'s transition methods, so a terminal
/// job can never change again.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    pub async fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshot of a job, or `JobNotFound`.
    pub async fn get_status(&self, id: &JobId) -> QueueResult<Job> {
        self.get(id).await.ok_or_else(|| QueueError::job_not_found(id))
    }

    /// Apply a transition to a job and return the updated snapshot.
    ///
    /// A rejected transition leaves the job untouched.
    pub async fn update<F>(&self, id: &JobId, f: F) -> QueueResult<Job>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| QueueError::job_not_found(id))?;
        f(job)?;
        Ok(job.clone())
    }

    pub async fn advance(&self, id: &JobId, progress: u8) -> QueueResult<Job> {
        self.update(id, |job| job.advance(progress)).await
    }

    pub async fn complete(&self, id: &JobId, blob: BlobRef) -> QueueResult<Job> {
        self.update(id, |job| job.complete(blob)).await
    }

    pub async fn fail(&self, id: &JobId, error: impl Into<String>) -> QueueResult<Job> {
        let error = error.into();
        self.update(id, |job| job.fail(error)).await
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Drop terminal jobs that finished more than `retention` ago.
    ///
    /// Jobs still processing are never removed.
    pub async fn evict_finished(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return 0;
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|id, job| match job.finished_at {
            Some(finished) if job.is_terminal() && finished <= cutoff => {
                debug!(job_id = %id, state = %job.state, "Reaping finished job");
                false
            }
            _ => true,
        });
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use douga_models::{JobState, RESOLVED_PROGRESS};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_status_of_unknown_job() {
        let registry = JobRegistry::new();
        let err = registry.get_status(&JobId::from("missing")).await.unwrap_err();
        assert!(matches!(err, QueueError::JobNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_transitions_only_move_forward() {
        let registry = JobRegistry::new();
        let job = Job::new("did:example:abc");
        let id = job.id.clone();
        registry.insert(job).await;

        let mut states = vec![registry.get_status(&id).await.unwrap().state];
        assert_ok!(registry.advance(&id, RESOLVED_PROGRESS).await);
        states.push(registry.get_status(&id).await.unwrap().state);
        assert_ok!(registry.complete(&id, BlobRef::new("bafy123", "video/mp4", 3)).await);
        states.push(registry.get_status(&id).await.unwrap().state);

        assert_err!(registry.fail(&id, "late failure").await);
        assert_err!(registry.advance(&id, 50).await);
        states.push(registry.get_status(&id).await.unwrap().state);

        assert_eq!(
            states,
            vec![
                JobState::Processing,
                JobState::Processing,
                JobState::Completed,
                JobState::Completed
            ]
        );
        let job = registry.get_status(&id).await.unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_evicts_only_finished_jobs() {
        let registry = JobRegistry::new();

        let running = Job::new("did:example:a");
        let running_id = running.id.clone();
        let finished = Job::new("did:example:b");
        let finished_id = finished.id.clone();
        registry.insert(running).await;
        registry.insert(finished).await;
        registry.fail(&finished_id, "user has no PDS").await.unwrap();

        assert_eq!(registry.evict_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.evict_finished(Duration::ZERO).await, 1);

        assert!(registry.get(&finished_id).await.is_none());
        assert!(registry.get(&running_id).await.is_some());
        assert_eq!(registry.len().await, 1);
    }
}
