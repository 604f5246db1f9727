//! On-disk artifact store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use douga_models::ArtifactKey;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::entry::{ArtifactEntry, ArtifactLease};
use crate::error::CacheResult;

/// Keyed table of artifact entries, each backed by its own temporary
/// directory under `root`.
///
/// The table lock covers insertion, removal and lease creation only. Per-key
/// derivation state lives in the entries themselves.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    ttl: Duration,
    entries: RwLock<HashMap<ArtifactKey, Arc<ArtifactEntry>>>,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> CacheResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            ttl,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a lease on the entry for `key`, creating it with a fresh empty
    /// directory if absent. The access time is refreshed either way.
    ///
    /// Concurrent callers for the same absent key observe the same entry and
    /// exactly one directory is allocated.
    pub async fn get_or_create(&self, key: ArtifactKey) -> CacheResult<ArtifactLease> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                entry.touch();
                return Ok(ArtifactLease::new(Arc::clone(entry)));
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&key) {
            entry.touch();
            return Ok(ArtifactLease::new(Arc::clone(entry)));
        }

        let dir = tempfile::Builder::new()
            .prefix(&key.dir_prefix())
            .tempdir_in(&self.root)?
            .keep();

        debug!(key = %key, dir = %dir.display(), "Allocated artifact entry");

        let entry = Arc::new(ArtifactEntry::new(key.clone(), dir));
        let lease = ArtifactLease::new(Arc::clone(&entry));
        entries.insert(key, entry);
        Ok(lease)
    }

    /// Lease an existing entry without creating one.
    pub async fn get(&self, key: &ArtifactKey) -> Option<ArtifactLease> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| {
            entry.touch();
            ArtifactLease::new(Arc::clone(entry))
        })
    }

    pub async fn contains(&self, key: &ArtifactKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove entries idle past the TTL and delete their directories.
    ///
    /// Entries that are deriving or leased are skipped. Returns the number of
    /// entries removed.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    pub(crate) async fn evict_idle_at(&self, now: Instant) -> usize {
        let evicted: Vec<Arc<ArtifactEntry>> = {
            let mut entries = self.entries.write().await;
            let expired: Vec<ArtifactKey> = entries
                .iter()
                .filter(|(_, entry)| entry.is_evictable(now, self.ttl))
                .map(|(key, _)| key.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|key| entries.remove(&key))
                .collect()
        };

        for entry in &evicted {
            debug!(
                key = %entry.key(),
                idle_secs = entry.idle_for(now).as_secs(),
                "Evicting artifact entry"
            );
            remove_dir(entry.dir()).await;
        }

        evicted.len()
    }

    /// Drop every entry and its directory. Used on shutdown.
    pub async fn purge(&self) -> usize {
        let drained: Vec<Arc<ArtifactEntry>> = {
            let mut entries = self.entries.write().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &drained {
            remove_dir(entry.dir()).await;
        }

        info!(count = drained.len(), root = %self.root.display(), "Purged artifact store");
        drained.len()
    }
}

async fn remove_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), "Failed to remove artifact directory: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use douga_models::ArtifactKind;

    fn key(cid: &str) -> ArtifactKey {
        ArtifactKey::new("did:plc:abc", cid, ArtifactKind::PlaylistBundle).unwrap()
    }

    fn dir_count(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_allocates_once() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(root.path(), Duration::from_secs(60)).unwrap());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let lease = store.get_or_create(key("bafy1")).await.unwrap();
                lease.dir().to_path_buf()
            }));
        }

        let mut dirs = Vec::new();
        for handle in handles {
            dirs.push(handle.await.unwrap());
        }

        assert!(dirs.windows(2).all(|w| w[0] == w[1]));
        assert!(dirs[0].is_dir());
        assert_eq!(dir_count(root.path()), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_directory_uses_key_prefix() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path(), Duration::from_secs(60)).unwrap();

        let lease = store.get_or_create(key("bafy1")).await.unwrap();
        let name = lease.dir().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("hls_did_plc_abc_bafy1_"), "{name}");
        assert_eq!(lease.primary_path(), lease.dir().join("playlist.m3u8"));
    }

    #[tokio::test]
    async fn test_long_did_web_allocates_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path(), Duration::from_secs(60)).unwrap();

        let subject = format!("did:web:{}.example", "a".repeat(300));
        let long = ArtifactKey::new(subject, "bafyabc", ArtifactKind::Thumbnail).unwrap();

        let lease = store.get_or_create(long).await.unwrap();
        assert!(lease.dir().is_dir());
        assert!(lease.dir().file_name().unwrap().len() < 255);
    }

    #[tokio::test]
    async fn test_lookup_refreshes_access_time() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path(), Duration::from_secs(60)).unwrap();

        let first = store.get_or_create(key("bafy1")).await.unwrap();
        let before = first.last_access();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = store.get_or_create(key("bafy1")).await.unwrap();
        assert!(second.last_access() > before);
    }

    #[tokio::test]
    async fn test_evicts_idle_entries_and_storage() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path(), Duration::from_secs(30)).unwrap();

        let dir = {
            let lease = store.get_or_create(key("bafy1")).await.unwrap();
            tokio::fs::write(lease.primary_path(), b"#EXTM3U").await.unwrap();
            lease.dir().to_path_buf()
        };

        assert_eq!(store.evict_idle_at(Instant::now()).await, 0);
        assert!(dir.exists());

        let later = Instant::now() + Duration::from_secs(31);
        assert_eq!(store.evict_idle_at(later).await, 1);
        assert!(!store.contains(&key("bafy1")).await);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_leased_and_deriving_entries_survive_eviction() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path(), Duration::from_secs(30)).unwrap();
        let later = Instant::now() + Duration::from_secs(31);

        let served = store.get_or_create(key("served")).await.unwrap();
        let deriving = store.get_or_create(key("deriving")).await.unwrap();
        assert!(deriving.mark_derivation_start());
        drop(deriving);

        assert_eq!(store.evict_idle_at(later).await, 0);
        assert_eq!(store.len().await, 2);
        assert!(served.dir().exists());

        drop(served);
        assert_eq!(store.evict_idle_at(later).await, 1);
        assert!(store.contains(&key("deriving")).await);
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path(), Duration::from_secs(30)).unwrap();

        store.get_or_create(key("a")).await.unwrap();
        store.get_or_create(key("b")).await.unwrap();

        assert_eq!(store.purge().await, 2);
        assert!(store.is_empty().await);
        assert_eq!(dir_count(root.path()), 0);
    }
}
