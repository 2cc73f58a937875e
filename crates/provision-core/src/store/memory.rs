// # Memory Job Store
//
// In-memory implementation of JobStore.
//
// ## Purpose
//
// Provides a fast job store that doesn't persist across restarts.
// Useful for testing and for embedding the pipeline where jobs are
// re-submitted on startup anyway.
//
// ## Crash Behavior
//
// - All jobs are lost on restart/crash
// - A domain whose purchase succeeded but whose job was lost must be
//   reconciled by hand; use `FileJobStore` in production

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::Error;
use crate::job::{JobId, JobState, ProvisioningJob};
use crate::store::queue::{DEFAULT_VISIBILITY_TIMEOUT, QueueState};
use crate::traits::job_store::{Delivery, JobStore};

/// In-memory job store implementation
///
/// All jobs live in a [`QueueState`] protected by a RwLock. Cloning the
/// store shares the same queue.
///
/// # Example
///
/// ```rust,no_run
/// use provision_core::job::ProvisioningJob;
/// use provision_core::store::MemoryJobStore;
/// use provision_core::traits::JobStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryJobStore::new();
///
///     let job = ProvisioningJob::new("example.com", "203.0.113.5".parse()?, "project-1", 3)?;
///     let id = store.enqueue(job).await?;
///
///     let delivery = store.dequeue().await?.expect("job is visible");
///     assert_eq!(delivery.job.id, id);
///     assert_eq!(delivery.job.attempts, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<QueueState>>,
    visibility_timeout: Duration,
}

impl MemoryJobStore {
    /// Create a new empty store with the default visibility timeout
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create a new empty store with a custom visibility timeout
    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(QueueState::default())),
            visibility_timeout,
        }
    }

    /// Get the number of jobs in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.len() == 0
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: ProvisioningJob) -> Result<JobId, Error> {
        let mut guard = self.inner.write().await;
        guard.enqueue(job)
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.dequeue(Utc::now(), self.visibility_timeout))
    }

    async fn update(&self, delivery: &Delivery) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.update(delivery, Utc::now(), self.visibility_timeout)
    }

    async fn ack(&self, delivery: Delivery, redeliver_after: Duration) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.ack(&delivery, Utc::now(), redeliver_after)
    }

    async fn complete(&self, delivery: Delivery, final_state: JobState) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.complete(&delivery, final_state, Utc::now())
    }

    async fn get(&self, job_id: &str) -> Result<Option<ProvisioningJob>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(job_id))
    }

    async fn list(&self) -> Result<Vec<ProvisioningJob>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.list())
    }

    async fn sweep(&self, older_than: DateTime<Utc>) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.sweep(older_than))
    }

    async fn acquire_domain_lock(
        &self,
        domain: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.acquire_lock(domain, owner, ttl, Utc::now()))
    }

    async fn release_domain_lock(&self, domain: &str, owner: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.release_lock(domain, owner);
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}
