//! Job creation and lookup.

use std::sync::Arc;

use bytes::Bytes;
use douga_atproto::BlobUpload;
use douga_models::{Job, JobId};
use metrics::counter;
use tracing::{error, info};

use crate::error::QueueResult;
use crate::registry::JobRegistry;
use crate::worker::{UploadRequest, UploadWorker};

/// Entry point of the upload pipeline.
#[derive(Clone)]
pub struct UploadQueue {
    registry: Arc<JobRegistry>,
    worker: Arc<UploadWorker>,
}

impl UploadQueue {
    pub fn new(registry: Arc<JobRegistry>, worker: Arc<UploadWorker>) -> Self {
        Self { registry, worker }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Register a new job and start relaying it in the background.
    ///
    /// The job is in the registry, `processing` at progress 1, before this
    /// returns; no network I/O happens on the caller's task.
    pub async fn create(
        &self,
        owner: impl Into<String>,
        authorization: Option<String>,
        content_type: Option<String>,
        body: Bytes,
    ) -> Job {
        let job = Job::new(owner);
        let request = UploadRequest {
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            upload: BlobUpload {
                authorization,
                content_type,
                body,
            },
        };

        self.registry.insert(job.clone()).await;
        counter!("douga_jobs_created_total").increment(1);
        info!(job_id = %job.id, did = %job.owner, "Created upload job");

        let worker = Arc::clone(&self.worker);
        tokio::spawn(async move {
            let job_id = request.job_id.clone();
            if let Err(e) = worker.run(request).await {
                error!(job_id = %job_id, "Upload worker failed: {}", e);
            }
        });

        job
    }

    /// Snapshot of a job's current state.
    pub async fn get_status(&self, id: &JobId) -> QueueResult<Job> {
        self.registry.get_status(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::tests::{FakeResolver, FakeUploader};
    use douga_models::{JobState, INITIAL_PROGRESS, RESOLVED_PROGRESS};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn queue(resolver: FakeResolver, uploader: Arc<FakeUploader>) -> UploadQueue {
        let registry = Arc::new(JobRegistry::new());
        let worker = Arc::new(UploadWorker::new(
            Arc::clone(&registry),
            Arc::new(resolver),
            uploader,
        ));
        UploadQueue::new(registry, worker)
    }

    async fn wait_until<F>(queue: &UploadQueue, id: &JobId, done: F) -> Job
    where
        F: Fn(&Job) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = queue.get_status(id).await.unwrap();
                if done(&job) {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not reach the expected state")
    }

    async fn create(queue: &UploadQueue) -> Job {
        queue
            .create(
                "did:example:abc",
                Some("Bearer service-token".to_string()),
                Some("video/mp4".to_string()),
                Bytes::from_static(b"mp4-bytes"),
            )
            .await
    }

    #[tokio::test]
    async fn test_job_is_visible_immediately() {
        let gate = Arc::new(Notify::new());
        let queue = queue(
            FakeResolver {
                pds: Some("https://pds.example".to_string()),
                gate: Some(Arc::clone(&gate)),
            },
            Arc::new(FakeUploader::default()),
        );

        let created = create(&queue).await;
        assert_eq!(created.state, JobState::Processing);
        assert_eq!(created.progress, INITIAL_PROGRESS);

        let status = queue.get_status(&created.id).await.unwrap();
        assert_eq!(status.state, JobState::Processing);
        assert!(status.progress >= 1);

        gate.notify_one();
        wait_until(&queue, &created.id, Job::is_terminal).await;
    }

    #[tokio::test]
    async fn test_progress_reaches_resolved_before_relay() {
        let gate = Arc::new(Notify::new());
        let queue = queue(
            FakeResolver {
                pds: Some("https://pds.example".to_string()),
                gate: None,
            },
            Arc::new(FakeUploader {
                gate: Some(Arc::clone(&gate)),
                ..Default::default()
            }),
        );

        let created = create(&queue).await;
        let job = wait_until(&queue, &created.id, |j| j.progress == RESOLVED_PROGRESS).await;
        assert_eq!(job.state, JobState::Processing);

        gate.notify_one();
        let job = wait_until(&queue, &created.id, Job::is_terminal).await;
        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_upload_then_poll_until_completed() {
        let queue = queue(
            FakeResolver {
                pds: Some("https://pds.example".to_string()),
                gate: None,
            },
            Arc::new(FakeUploader::default()),
        );

        let created = create(&queue).await;
        let job = wait_until(&queue, &created.id, Job::is_terminal).await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.blob.as_ref().map(|b| b.cid()), Some("bafy123"));
    }

    #[tokio::test]
    async fn test_upload_then_poll_until_failed() {
        let queue = queue(
            FakeResolver {
                pds: None,
                gate: None,
            },
            Arc::new(FakeUploader::default()),
        );

        let created = create(&queue).await;
        let job = wait_until(&queue, &created.id, Job::is_terminal).await;

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("user has no PDS"));
    }

    #[tokio::test]
    async fn test_credentials_are_not_stored_on_job() {
        let gate = Arc::new(Notify::new());
        let queue = queue(
            FakeResolver {
                pds: Some("https://pds.example".to_string()),
                gate: Some(Arc::clone(&gate)),
            },
            Arc::new(FakeUploader::default()),
        );

        let created = create(&queue).await;
        let json = serde_json::to_string(&queue.get_status(&created.id).await.unwrap()).unwrap();
        assert!(!json.contains("service-token"));
        gate.notify_one();
    }
}
