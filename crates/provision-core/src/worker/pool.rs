//! Worker pool
//!
//! Runs N copies of the worker poll loop as tokio tasks sharing one
//! broadcast shutdown signal.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::ProvisioningWorker;

/// A set of running worker tasks
pub struct WorkerPool {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` worker tasks (at least one)
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(worker: Arc<ProvisioningWorker>, concurrency: usize) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let concurrency = concurrency.max(1);

        let handles = (0..concurrency)
            .map(|worker_id| {
                let worker = Arc::clone(&worker);
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(async move { worker.run(worker_id, shutdown_rx).await })
            })
            .collect();

        info!(workers = concurrency, "Worker pool started");
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Number of worker tasks
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Subscribe another task (e.g. the sweeper) to the pool's shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every task to stop and wait for them
    ///
    /// Workers finish the delivery they are processing before exiting.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());

        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }

        info!("Worker pool shut down");
    }
}
