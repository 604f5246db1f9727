//! Upload relay worker.

use std::sync::Arc;

use douga_atproto::{BlobUpload, BlobUploader, IdentityResolver};
use douga_models::{Job, JobId, RESOLVED_PROGRESS};
use metrics::counter;
use tracing::Instrument;

use crate::error::QueueResult;
use crate::logging::{RelayLogger, RelayStage};
use crate::registry::JobRegistry;

/// Everything a worker needs to relay one upload.
///
/// The credentials live here and not on the [`Job`], so they are gone once
/// the relay finishes.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub job_id: JobId,
    pub owner: String,
    pub upload: BlobUpload,
}

/// Resolves the owner's PDS, relays the blob once and records the outcome.
pub struct UploadWorker {
    registry: Arc<JobRegistry>,
    resolver: Arc<dyn IdentityResolver>,
    uploader: Arc<dyn BlobUploader>,
}

impl UploadWorker {
    pub fn new(
        registry: Arc<JobRegistry>,
        resolver: Arc<dyn IdentityResolver>,
        uploader: Arc<dyn BlobUploader>,
    ) -> Self {
        Self {
            registry,
            resolver,
            uploader,
        }
    }

    /// Drive one job to a terminal state and return its final snapshot.
    ///
    /// Relay failures end up on the job; the error path here only covers the
    /// job having vanished from the registry.
    pub async fn run(&self, request: UploadRequest) -> QueueResult<Job> {
        let logger = RelayLogger::new(&request.job_id, &request.owner, request.upload.body.len());
        let span = logger.span();
        self.relay(request, &logger).instrument(span).await
    }

    async fn relay(&self, request: UploadRequest, logger: &RelayLogger) -> QueueResult<Job> {
        let UploadRequest {
            job_id,
            owner,
            upload,
        } = request;

        logger.enter(RelayStage::Resolve);
        let pds = match self.resolver.resolve_pds(&owner).await {
            Ok(pds) => pds,
            Err(e) => return self.fail(&job_id, logger, RelayStage::Resolve, e.to_string()).await,
        };

        self.registry.advance(&job_id, RESOLVED_PROGRESS).await?;
        logger.resolved(&pds);

        logger.enter(RelayStage::Upload);
        match self.uploader.upload_blob(&pds, upload).await {
            Ok(blob) => {
                let job = self.registry.complete(&job_id, blob).await?;
                counter!("douga_jobs_completed_total").increment(1);
                logger.stored(job.blob.as_ref().map_or("", |b| b.cid()));
                Ok(job)
            }
            Err(e) => self.fail(&job_id, logger, RelayStage::Upload, e.to_string()).await,
        }
    }

    async fn fail(
        &self,
        job_id: &JobId,
        logger: &RelayLogger,
        stage: RelayStage,
        error: String,
    ) -> QueueResult<Job> {
        logger.failed(stage, &error);
        counter!("douga_jobs_failed_total", "stage" => stage.as_str()).increment(1);
        self.registry.fail(job_id, error).await
    }
}
