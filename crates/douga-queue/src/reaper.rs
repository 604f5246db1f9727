//! Background removal of finished jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::JobRegistry;

/// Drops terminal jobs once they are older than the retention window.
pub struct JobReaper {
    registry: Arc<JobRegistry>,
    retention: Duration,
    interval: Duration,
}

impl JobReaper {
    pub fn new(registry: Arc<JobRegistry>, retention: Duration, interval: Duration) -> Self {
        Self {
            registry,
            retention,
            interval,
        }
    }

    /// Start the reap loop; returns once `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting job reaper (interval: {:?}, retention: {:?})",
            self.interval, self.retention
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Job reaper stopped");
    }

    pub async fn reap_once(&self) -> usize {
        let reaped = self.registry.evict_finished(self.retention).await;
        if reaped > 0 {
            info!(reaped, "Reaped finished jobs");
        } else {
            debug!("No finished jobs to reap");
        }
        reaped
    }
}
