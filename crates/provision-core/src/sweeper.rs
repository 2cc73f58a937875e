//! Housekeeping sweeper
//!
//! Periodically deletes terminal jobs whose last update is older than the
//! retention window. Active jobs are never touched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info};

use crate::config::SweeperConfig;
use crate::error::Result;
use crate::store::queue::to_chrono;
use crate::traits::JobStore;

/// Periodic cleanup of old terminal jobs
pub struct Sweeper {
    store: Arc<dyn JobStore>,
    retention: Duration,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn JobStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    /// Build a sweeper from configuration
    pub fn from_config(store: Arc<dyn JobStore>, config: &SweeperConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(config.retention_secs),
            Duration::from_secs(config.interval_secs),
        )
    }

    /// Remove terminal jobs older than the retention window
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - to_chrono(self.retention);
        let removed = self.store.sweep(cutoff).await?;

        if removed > 0 {
            info!("Swept {} terminal job(s) last updated before {}", removed, cutoff);
        } else {
            debug!("Sweep found nothing older than {}", cutoff);
        }
        Ok(removed)
    }

    /// Sweep on every interval tick until `shutdown` fires
    ///
    /// The first sweep runs immediately. A failed sweep is logged and the
    /// next tick runs as scheduled.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticks = IntervalStream::new(tokio::time::interval(period));

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Sweep failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Sweeper stopped");
                    break;
                }
            }
        }
    }
}
