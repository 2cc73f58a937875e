// # Job Store Trait
//
// Defines the interface for the durable provisioning job queue.
//
// ## Purpose
//
// The job store is the only shared mutable resource in the pipeline. It:
// - Persists every job and its state across process restarts
// - Delivers runnable jobs to workers at least once
// - Guarantees a job is leased to at most one worker at a time
// - Enforces domain uniqueness among active jobs
//
// ## Delivery Model
//
// ```text
// enqueue ──▶ [visible] ──dequeue──▶ [leased] ──update──▶ [leased]
//                 ▲                     │  │
//                 └──── ack(delay) ─────┘  └──complete──▶ [terminal]
//                 ▲                     │
//                 └── lease expires ────┘   (worker crashed)
// ```
//
// ## Implementations
//
// - In-memory: `MemoryJobStore` (tests, embedding)
// - File-based: `FileJobStore` (atomic JSON snapshots)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::job::{JobId, JobState, ProvisioningJob};

/// A leased job handed to a worker
///
/// The receipt fences writes: once the lease expires and the job is
/// delivered again, writes carrying the old receipt are rejected with
/// [`crate::Error::LeaseLost`].
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The job as persisted at dequeue time (attempts already incremented)
    pub job: ProvisioningJob,
    receipt: String,
    exhausted: bool,
}

impl Delivery {
    /// Create a delivery for a leased job
    pub fn new(job: ProvisioningJob, receipt: impl Into<String>, exhausted: bool) -> Self {
        Self {
            job,
            receipt: receipt.into(),
            exhausted,
        }
    }

    /// Lease receipt for this delivery
    pub fn receipt(&self) -> &str {
        &self.receipt
    }

    /// Whether the job had already used its whole attempt budget when
    /// it was dequeued (the previous delivery never reported back)
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Trait for job store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple workers.
///
/// # Durability
///
/// Every mutating method must be persisted before it returns `Ok`, so a
/// crash right after a successful `update` is recovered by redelivering
/// the job in the state that was written.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a new job to the queue
    ///
    /// # Returns
    ///
    /// - `Ok(JobId)`: The job is queued and immediately visible
    /// - `Err(Error::DuplicateActiveDomain)`: An active job targets the same domain
    async fn enqueue(&self, job: ProvisioningJob) -> Result<JobId, crate::Error>;

    /// Lease the next runnable job, if any
    ///
    /// Increments `attempts` before returning, unless the attempt budget
    /// is already spent (see [`Delivery::is_exhausted`]).
    async fn dequeue(&self) -> Result<Option<Delivery>, crate::Error>;

    /// Persist the in-flight job and extend the lease
    async fn update(&self, delivery: &Delivery) -> Result<(), crate::Error>;

    /// End the delivery without a terminal state
    ///
    /// The job is persisted as-is and becomes visible again after
    /// `redeliver_after`.
    async fn ack(&self, delivery: Delivery, redeliver_after: Duration)
    -> Result<(), crate::Error>;

    /// End the delivery with a terminal state
    async fn complete(&self, delivery: Delivery, final_state: JobState)
    -> Result<(), crate::Error>;

    /// Get a job by id
    async fn get(&self, job_id: &str) -> Result<Option<ProvisioningJob>, crate::Error>;

    /// List all jobs
    async fn list(&self) -> Result<Vec<ProvisioningJob>, crate::Error>;

    /// Delete terminal jobs last updated before `older_than`
    ///
    /// Active jobs are never removed.
    async fn sweep(&self, older_than: DateTime<Utc>) -> Result<usize, crate::Error>;

    /// Try to take the short-lived purchase lock for a domain
    ///
    /// Returns `false` while another owner holds an unexpired lock.
    async fn acquire_domain_lock(
        &self,
        domain: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, crate::Error>;

    /// Release a domain lock held by `owner` (no-op otherwise)
    async fn release_domain_lock(&self, domain: &str, owner: &str) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
