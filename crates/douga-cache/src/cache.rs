//! Artifact lookup with single-flight derivation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use douga_models::ArtifactKey;
use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::derive::Deriver;
use crate::entry::{ArtifactLease, Claim, DerivationPhase};
use crate::error::{CacheError, CacheResult};
use crate::store::ArtifactStore;

/// Result of an artifact lookup.
#[derive(Debug)]
pub enum Fetch {
    /// Backing storage is populated; the lease keeps it alive while serving
    Ready(ArtifactLease),
    /// Another request is still deriving; poll again after `retry_after`
    Pending { retry_after: Duration },
}

/// Front of the artifact store: looks entries up and derives them on first
/// access.
///
/// The first requester of an absent key claims the entry's gate, starts the
/// derivation on its own task and waits for it. Requests arriving while that
/// derivation runs wait up to `join_wait` and then get [`Fetch::Pending`].
pub struct ArtifactCache {
    store: Arc<ArtifactStore>,
    deriver: Arc<dyn Deriver>,
    join_wait: Duration,
    retry_after: Duration,
}

impl ArtifactCache {
    pub fn new(store: Arc<ArtifactStore>, deriver: Arc<dyn Deriver>) -> Self {
        let defaults = CacheConfig::default();
        Self {
            store,
            deriver,
            join_wait: defaults.join_wait,
            retry_after: defaults.retry_after,
        }
    }

    /// Set how long late joiners wait and the poll hint they get afterwards.
    pub fn with_join_wait(mut self, join_wait: Duration, retry_after: Duration) -> Self {
        self.join_wait = join_wait;
        self.retry_after = retry_after;
        self
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Look up `key`, deriving it if this is the first request.
    ///
    /// A recorded derivation failure is returned as [`CacheError::Derivation`]
    /// until the entry is evicted.
    pub async fn fetch(&self, key: ArtifactKey) -> CacheResult<Fetch> {
        let lease = self.store.get_or_create(key).await?;

        match lease.claim() {
            Claim::Ready => {
                counter!("douga_artifact_cache_hits_total", "kind" => lease.key().kind().as_str())
                    .increment(1);
                Ok(Fetch::Ready(lease))
            }
            Claim::Failed(error) => Err(CacheError::Derivation(error)),
            Claim::Acquired => {
                counter!("douga_artifact_cache_misses_total", "kind" => lease.key().kind().as_str())
                    .increment(1);
                self.spawn_derivation(lease.clone());
                self.wait(lease, None).await
            }
            Claim::InFlight => self.wait(lease, Some(self.join_wait)).await,
        }
    }

    /// Run the derivation detached from the request so a dropped connection
    /// cannot leave the entry stuck in `Deriving`.
    fn spawn_derivation(&self, lease: ArtifactLease) {
        let deriver = Arc::clone(&self.deriver);

        tokio::spawn(async move {
            let mut guard = DerivationGuard::new(lease);
            let key = guard.lease.key().clone();
            let kind = key.kind().as_str();
            let start = Instant::now();

            info!(key = %key, "Deriving artifact");
            let result = deriver.derive(&key, guard.lease.dir()).await;
            let elapsed = start.elapsed();
            histogram!("douga_derivation_duration_seconds", "kind" => kind)
                .record(elapsed.as_secs_f64());

            match result {
                Ok(()) => {
                    counter!("douga_derivations_total", "kind" => kind, "status" => "success")
                        .increment(1);
                    info!(
                        key = %key,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Artifact derived"
                    );
                    guard.finish(None);
                }
                Err(e) => {
                    counter!("douga_derivations_total", "kind" => kind, "status" => "failure")
                        .increment(1);
                    warn!(key = %key, "Derivation failed: {}", e);
                    guard.finish(Some(e.to_string()));
                }
            }
        });
    }

    async fn wait(&self, lease: ArtifactLease, limit: Option<Duration>) -> CacheResult<Fetch> {
        let mut rx = lease.subscribe();
        let settled = async {
            rx.wait_for(|phase| *phase != DerivationPhase::Deriving)
                .await
                .map(|phase| phase.clone())
        };

        let phase = match limit {
            Some(limit) => match tokio::time::timeout(limit, settled).await {
                Ok(phase) => phase,
                Err(_) => {
                    return Ok(Fetch::Pending {
                        retry_after: self.retry_after,
                    })
                }
            },
            None => settled.await,
        };

        match phase {
            Ok(DerivationPhase::Ready) => Ok(Fetch::Ready(lease)),
            Ok(DerivationPhase::Failed(error)) => Err(CacheError::Derivation(error)),
            Ok(phase) => Err(CacheError::internal(format!(
                "unexpected phase {:?} for {}",
                phase,
                lease.key()
            ))),
            Err(_) => Err(CacheError::internal("derivation state dropped")),
        }
    }
}

/// Records a failure if the derivation task ends without reporting, e.g. by
/// panicking inside the transcoder wrapper.
struct DerivationGuard {
    lease: ArtifactLease,
    finished: bool,
}

impl DerivationGuard {
    fn new(lease: ArtifactLease) -> Self {
        Self {
            lease,
            finished: false,
        }
    }

    fn finish(&mut self, error: Option<String>) {
        self.finished = true;
        self.lease.mark_derivation_end(error);
    }
}

impl Drop for DerivationGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.lease
                .mark_derivation_end(Some("derivation aborted".to_string()));
        }
    }
}
