//! Cache entries and leases.
//!
//! Each entry owns its derivation phase in a `watch` channel. The phase is
//! the single-flight gate: claiming it is one atomic `send_if_modified`, and
//! waiters subscribe to it without touching the store's table lock.
//!
//! A lease pins an entry against eviction. Leases are only created while the
//! store's table lock is held, so the sweeper never races a new lease.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use douga_models::{ArtifactFile, ArtifactKey};
use tokio::sync::watch;

use crate::error::{CacheError, CacheResult};

/// Where an entry is in its derivation lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationPhase {
    /// Storage allocated, nothing derived yet
    Empty,
    /// A derivation holds the gate
    Deriving,
    /// Backing storage is populated
    Ready,
    /// Last derivation failed with this error
    Failed(String),
}

/// Outcome of trying to pass the single-flight gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Claim {
    /// Caller now owns the derivation
    Acquired,
    /// Someone else is deriving
    InFlight,
    Ready,
    Failed(String),
}

/// One derived-artifact cache slot.
#[derive(Debug)]
pub struct ArtifactEntry {
    key: ArtifactKey,
    dir: PathBuf,
    last_access: Mutex<Instant>,
    phase: watch::Sender<DerivationPhase>,
    leases: AtomicUsize,
}

impl ArtifactEntry {
    pub(crate) fn new(key: ArtifactKey, dir: PathBuf) -> Self {
        let now = Instant::now();
        let (phase, _) = watch::channel(DerivationPhase::Empty);
        Self {
            key,
            dir,
            last_access: Mutex::new(now),
            phase,
            leases: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    /// Backing directory of this slot.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file whose presence marks a finished derivation.
    pub fn primary_path(&self) -> PathBuf {
        self.dir.join(self.key.kind().primary_file())
    }

    pub fn file_path(&self, file: &ArtifactFile) -> PathBuf {
        self.dir.join(file.file_name())
    }

    /// Refresh the last-access timestamp.
    pub fn touch(&self) {
        let mut last = self.last_access.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }

    pub fn phase(&self) -> DerivationPhase {
        self.phase.borrow().clone()
    }

    pub fn is_deriving(&self) -> bool {
        matches!(*self.phase.borrow(), DerivationPhase::Deriving)
    }

    /// Recorded error of the last derivation, if it failed.
    pub fn error(&self) -> Option<String> {
        match &*self.phase.borrow() {
            DerivationPhase::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Set the in-progress flag.
    ///
    /// Returns `false` without touching anything when a derivation is already
    /// in progress for this entry.
    pub fn mark_derivation_start(&self) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == DerivationPhase::Deriving {
                false
            } else {
                *phase = DerivationPhase::Deriving;
                true
            }
        })
    }

    /// Clear the in-progress flag and record the outcome.
    pub fn mark_derivation_end(&self, error: Option<String>) {
        self.phase.send_replace(match error {
            Some(e) => DerivationPhase::Failed(e),
            None => DerivationPhase::Ready,
        });
    }

    /// Claim the gate only if nothing has been derived yet.
    ///
    /// Unlike [`mark_derivation_start`](Self::mark_derivation_start), a failed
    /// entry is not re-claimed: its error stands until eviction.
    pub(crate) fn claim(&self) -> Claim {
        let mut claim = Claim::InFlight;
        self.phase.send_if_modified(|phase| match phase {
            DerivationPhase::Empty => {
                *phase = DerivationPhase::Deriving;
                claim = Claim::Acquired;
                true
            }
            DerivationPhase::Deriving => false,
            DerivationPhase::Ready => {
                claim = Claim::Ready;
                false
            }
            DerivationPhase::Failed(e) => {
                claim = Claim::Failed(e.clone());
                false
            }
        });
        claim
    }

    pub fn subscribe(&self) -> watch::Receiver<DerivationPhase> {
        self.phase.subscribe()
    }

    /// Number of live leases on this entry.
    pub fn active_leases(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }

    /// Idle past `ttl`, not deriving and not being served.
    pub fn is_evictable(&self, now: Instant, ttl: Duration) -> bool {
        !self.is_deriving() && self.active_leases() == 0 && self.idle_for(now) > ttl
    }
}

/// A pinned reference to an entry; the entry cannot be evicted while any lease
/// on it is alive.
#[derive(Debug)]
pub struct ArtifactLease {
    entry: Arc<ArtifactEntry>,
}

impl ArtifactLease {
    pub(crate) fn new(entry: Arc<ArtifactEntry>) -> Self {
        entry.leases.fetch_add(1, Ordering::AcqRel);
        Self { entry }
    }

    pub fn entry(&self) -> &Arc<ArtifactEntry> {
        &self.entry
    }

    /// Read one file out of the slot.
    pub async fn read(&self, file: &ArtifactFile) -> CacheResult<Vec<u8>> {
        match tokio::fs::read(self.entry.file_path(file)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::FileNotFound(file.file_name()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Clone for ArtifactLease {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.entry))
    }
}

impl Deref for ArtifactLease {
    type Target = ArtifactEntry;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        self.entry.leases.fetch_sub(1, Ordering::AcqRel);
    }
}
