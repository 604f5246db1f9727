//! Background eviction of idle artifact entries.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::store::ArtifactStore;

/// Periodically reclaims entries idle past the store's TTL.
pub struct EvictionSweeper {
    store: Arc<ArtifactStore>,
    interval: Duration,
}

impl EvictionSweeper {
    pub fn new(store: Arc<ArtifactStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Start the sweep loop.
    ///
    /// Runs until `shutdown` flips to `true` or its sender is dropped; spawn it
    /// as a background task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting artifact sweeper (interval: {:?}, ttl: {:?})",
            self.interval,
            self.store.ttl()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and there is nothing to sweep yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Artifact sweeper stopped");
    }

    /// Run a single sweep. Returns the number of evicted entries.
    pub async fn sweep_once(&self) -> usize {
        let evicted = self.store.evict_idle().await;
        let remaining = self.store.len().await;

        counter!("douga_artifact_evictions_total").increment(evicted as u64);
        gauge!("douga_artifact_entries").set(remaining as f64);

        if evicted > 0 {
            info!(evicted, remaining, "Evicted idle artifacts");
        } else {
            debug!(remaining, "Artifact sweep found nothing to evict");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use douga_models::{ArtifactKey, ArtifactKind};

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(root.path(), Duration::from_millis(200)).unwrap());
        let key = ArtifactKey::new("did:plc:abc", "bafy123", ArtifactKind::Thumbnail).unwrap();

        let dir = store.get_or_create(key.clone()).await.unwrap().dir().to_path_buf();
        let sweeper = EvictionSweeper::new(Arc::clone(&store), Duration::from_secs(60));

        assert_eq!(sweeper.sweep_once().await, 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sweeper.sweep_once().await, 1);
        assert!(!store.contains(&key).await);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(root.path(), Duration::from_secs(60)).unwrap());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(EvictionSweeper::new(store, Duration::from_millis(10)).run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
