//! Queue bookkeeping shared by the job store implementations
//!
//! [`QueueState`] holds every job plus its delivery metadata and applies
//! the queue rules (visibility, leases, domain uniqueness, purchase locks).
//! It is pure: callers pass the current time in and take care of locking
//! and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::job::{JobId, JobState, ProvisioningJob};
use crate::traits::Delivery;

/// Default visibility timeout for a delivery lease
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);

/// Jobs and delivery metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct QueueState {
    #[serde(default)]
    jobs: HashMap<JobId, QueueEntry>,
    #[serde(default)]
    locks: HashMap<String, DomainLock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueEntry {
    job: ProvisioningJob,
    visible_at: DateTime<Utc>,
    #[serde(default)]
    lease: Option<Lease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Lease {
    receipt: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DomainLock {
    owner: String,
    expires_at: DateTime<Utc>,
}

impl QueueEntry {
    fn is_runnable(&self, now: DateTime<Utc>) -> bool {
        !self.job.is_terminal()
            && self.visible_at <= now
            && self.lease.as_ref().is_none_or(|l| l.expires_at <= now)
    }
}

/// Convert a std duration for timestamp arithmetic
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

impl QueueState {
    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn enqueue(&mut self, job: ProvisioningJob) -> Result<JobId> {
        if job.is_terminal() {
            return Err(Error::invalid_input(format!(
                "Cannot enqueue job {} in terminal state {}",
                job.id, job.state
            )));
        }

        if let Some(active) = self
            .jobs
            .values()
            .find(|e| !e.job.is_terminal() && e.job.domain == job.domain)
        {
            return Err(Error::DuplicateActiveDomain {
                domain: job.domain.clone(),
                job_id: active.job.id.clone(),
            });
        }

        if self.jobs.contains_key(&job.id) {
            return Err(Error::job_store(format!("Job id {} already exists", job.id)));
        }

        let id = job.id.clone();
        let visible_at = job.created_at;
        self.jobs.insert(
            id.clone(),
            QueueEntry {
                job,
                visible_at,
                lease: None,
            },
        );
        Ok(id)
    }

    pub(crate) fn dequeue(&mut self, now: DateTime<Utc>, visibility: Duration) -> Option<Delivery> {
        let entry = self
            .jobs
            .values_mut()
            .filter(|e| e.is_runnable(now))
            .min_by_key(|e| (e.visible_at, e.job.created_at))?;

        if entry.lease.is_some() {
            tracing::warn!(
                "Lease expired for job {} ({}), redelivering in state {}",
                entry.job.id,
                entry.job.domain,
                entry.job.state
            );
        }

        let receipt = uuid::Uuid::new_v4().to_string();
        entry.lease = Some(Lease {
            receipt: receipt.clone(),
            expires_at: now + to_chrono(visibility),
        });

        let exhausted = entry.job.attempts_exhausted();
        if !exhausted {
            entry.job.attempts += 1;
        }
        entry.job.updated_at = now;

        Some(Delivery::new(entry.job.clone(), receipt, exhausted))
    }

    pub(crate) fn update(
        &mut self,
        delivery: &Delivery,
        now: DateTime<Utc>,
        visibility: Duration,
    ) -> Result<()> {
        reject_terminal(delivery, "update")?;
        let entry = self.leased_entry_mut(delivery)?;

        entry.job = delivery.job.clone();
        entry.job.updated_at = now;
        if let Some(lease) = entry.lease.as_mut() {
            lease.expires_at = now + to_chrono(visibility);
        }
        Ok(())
    }

    pub(crate) fn ack(
        &mut self,
        delivery: &Delivery,
        now: DateTime<Utc>,
        redeliver_after: Duration,
    ) -> Result<()> {
        reject_terminal(delivery, "ack")?;
        let entry = self.leased_entry_mut(delivery)?;

        entry.job = delivery.job.clone();
        entry.job.updated_at = now;
        entry.lease = None;
        entry.visible_at = now + to_chrono(redeliver_after);
        Ok(())
    }

    pub(crate) fn complete(
        &mut self,
        delivery: &Delivery,
        final_state: JobState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !final_state.is_terminal() {
            return Err(Error::invalid_input(format!(
                "complete() requires a terminal state, got {}",
                final_state
            )));
        }
        let entry = self.leased_entry_mut(delivery)?;

        entry.job = delivery.job.clone();
        entry.job.state = final_state;
        if final_state == JobState::Completed {
            entry.job.last_error = None;
        }
        entry.job.updated_at = now;
        entry.lease = None;
        Ok(())
    }

    pub(crate) fn get(&self, job_id: &str) -> Option<ProvisioningJob> {
        self.jobs.get(job_id).map(|e| e.job.clone())
    }

    pub(crate) fn list(&self) -> Vec<ProvisioningJob> {
        let mut jobs: Vec<ProvisioningJob> = self.jobs.values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub(crate) fn sweep(&mut self, older_than: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, e| !(e.job.is_terminal() && e.job.updated_at < older_than));
        before - self.jobs.len()
    }

    pub(crate) fn acquire_lock(
        &mut self,
        domain: &str,
        owner: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(lock) = self.locks.get(domain)
            && lock.owner != owner
            && lock.expires_at > now
        {
            return false;
        }

        self.locks.insert(
            domain.to_string(),
            DomainLock {
                owner: owner.to_string(),
                expires_at: now + to_chrono(ttl),
            },
        );
        true
    }

    /// Returns whether a lock was removed
    pub(crate) fn release_lock(&mut self, domain: &str, owner: &str) -> bool {
        if self.locks.get(domain).is_some_and(|l| l.owner == owner) {
            self.locks.remove(domain);
            true
        } else {
            false
        }
    }

    fn leased_entry_mut(&mut self, delivery: &Delivery) -> Result<&mut QueueEntry> {
        let entry = self
            .jobs
            .get_mut(&delivery.job.id)
            .ok_or_else(|| Error::not_found(delivery.job.id.clone()))?;

        // A redelivery replaces the receipt, so a matching receipt means
        // nobody else has picked the job up, even if the lease ran out.
        let held = entry
            .lease
            .as_ref()
            .is_some_and(|l| l.receipt == delivery.receipt());
        if !held {
            return Err(Error::LeaseLost(delivery.job.id.clone()));
        }
        Ok(entry)
    }
}

fn reject_terminal(delivery: &Delivery, operation: &str) -> Result<()> {
    if delivery.job.is_terminal() {
        return Err(Error::invalid_input(format!(
            "{}() cannot persist terminal state {} for job {}; use complete()",
            operation, delivery.job.state, delivery.job.id
        )));
    }
    Ok(())
}
