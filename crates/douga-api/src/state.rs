//! Application state.

use std::sync::Arc;

use anyhow::Context;
use douga_atproto::{BlobUploader, DidResolver, IdentityResolver, PdsClient};
use douga_cache::{ArtifactCache, ArtifactStore, BlobSource, Deriver, FfmpegDeriver, HttpBlobSource};
use douga_queue::{JobRegistry, UploadQueue, UploadWorker};

use crate::auth::{AuthVerifier, ServiceAuthVerifier};
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub cache: Arc<ArtifactCache>,
    pub jobs: UploadQueue,
    pub auth: Arc<dyn AuthVerifier>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let source: Arc<dyn BlobSource> = Arc::new(
            HttpBlobSource::new(&config.cache.origin_url, config.cache.origin_timeout)
                .context("failed to build content origin client")?,
        );
        let store = Arc::new(
            ArtifactStore::new(&config.cache.root_dir, config.cache.ttl)
                .context("failed to prepare cache directory")?,
        );
        let deriver: Arc<dyn Deriver> = Arc::new(FfmpegDeriver::new(
            source,
            store.root().to_path_buf(),
            config.cache.hls_options(),
            config.cache.thumbnail_options(),
        ));

        let resolver: Arc<dyn IdentityResolver> = Arc::new(
            DidResolver::new(&config.atproto).context("failed to build identity resolver")?,
        );
        let uploader: Arc<dyn BlobUploader> =
            Arc::new(PdsClient::new(&config.atproto).context("failed to build PDS client")?);

        let auth: Arc<dyn AuthVerifier> = Arc::new(ServiceAuthVerifier::new(config.service_did()));

        Ok(Self::from_parts(config, store, deriver, resolver, uploader, auth))
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<ArtifactStore>,
        deriver: Arc<dyn Deriver>,
        resolver: Arc<dyn IdentityResolver>,
        uploader: Arc<dyn BlobUploader>,
        auth: Arc<dyn AuthVerifier>,
    ) -> Self {
        let cache = ArtifactCache::new(store, deriver)
            .with_join_wait(config.cache.join_wait, config.cache.retry_after);

        let registry = Arc::new(JobRegistry::new());
        let worker = Arc::new(UploadWorker::new(Arc::clone(&registry), resolver, uploader));
        let jobs = UploadQueue::new(registry, worker);

        Self {
            config,
            cache: Arc::new(cache),
            jobs,
            auth,
        }
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        self.cache.store()
    }
}
