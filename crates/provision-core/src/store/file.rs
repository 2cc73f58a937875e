// # File Job Store
//
// File-based implementation of JobStore with crash recovery.
//
// ## Purpose
//
// Keeps provisioning jobs durable across daemon restarts and crashes.
// A job whose purchase succeeded is persisted as `configuring_dns` before
// the DNS write starts, so a restart resumes it there instead of buying
// the domain again.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// Leases survive a restart too. A job that was in flight when the process
// died becomes visible again once its lease expires.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "queue": {
//     "jobs": {
//       "5b0c...": {
//         "job": { "id": "5b0c...", "domain": "example.com", "state": "verifying", ... },
//         "visible_at": "2025-01-09T12:00:00Z",
//         "lease": { "receipt": "91fe...", "expires_at": "2025-01-09T12:02:00Z" }
//       }
//     },
//     "locks": {}
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::job::{JobId, JobState, ProvisioningJob};
use crate::store::queue::{DEFAULT_VISIBILITY_TIMEOUT, QueueState};
use crate::traits::job_store::{Delivery, JobStore};

/// Job file format version
/// Used for future migration if format changes
const JOB_FILE_VERSION: &str = "1.0";

/// File-based job store with crash recovery
///
/// Every mutation is applied to a copy of the queue, written to disk, and
/// only then made visible. A failed write leaves both the file and the
/// in-memory queue as they were.
///
/// # Example
///
/// ```rust,no_run
/// use provision_core::job::ProvisioningJob;
/// use provision_core::store::FileJobStore;
/// use provision_core::traits::JobStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileJobStore::new("/var/lib/provisiond/jobs.json").await?;
///
///     let job = ProvisioningJob::new("example.com", "203.0.113.5".parse()?, "project-1", 3)?;
///     let id = store.enqueue(job).await?; // atomically written to disk
///
///     let stored = store.get(&id).await?;
///     assert!(stored.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    queue: Arc<RwLock<QueueState>>,
    /// Held for a whole read-modify-write, so mutations never interleave
    io_lock: Mutex<()>,
    visibility_timeout: Duration,
}

/// Serializable job file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct JobFileFormat {
    version: String,
    queue: QueueState,
}

impl FileJobStore {
    /// Create or load a file job store with the default visibility timeout
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::with_visibility_timeout(path, DEFAULT_VISIBILITY_TIMEOUT).await
    }

    /// Create or load a file job store
    ///
    /// This will:
    /// 1. Try to load existing job file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with an empty queue
    /// 4. Create parent directories if needed
    pub async fn with_visibility_timeout<P: AsRef<Path>>(
        path: P,
        visibility_timeout: Duration,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create job store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let queue = Self::load_queue_with_recovery(&path).await?;

        Ok(Self {
            path,
            queue: Arc::new(RwLock::new(queue)),
            io_lock: Mutex::new(()),
            visibility_timeout,
        })
    }

    /// Load the queue with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main job file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with an empty queue
    async fn load_queue_with_recovery(path: &Path) -> Result<QueueState, Error> {
        match Self::load_queue(path).await {
            Ok(queue) => {
                tracing::debug!("Loaded job file: {} jobs", queue.len());
                Ok(queue)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Job file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty queue.");
                    return Ok(QueueState::default());
                }

                match Self::load_queue(&backup_path).await {
                    Ok(queue) => {
                        tracing::info!("Recovered job queue from backup: {} jobs", queue.len());

                        if let Err(restore_err) =
                            Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore job file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(queue)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty queue.",
                            backup_err
                        );
                        Ok(QueueState::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load the queue from a file
    ///
    /// Parse failures come back as [`Error::Json`] so the caller can tell
    /// corruption apart from I/O trouble.
    async fn load_queue(path: &Path) -> Result<QueueState, Error> {
        if !path.exists() {
            tracing::debug!("Job file does not exist: {}", path.display());
            return Ok(QueueState::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::job_store(format!("Failed to read job file {}: {}", path.display(), e))
        })?;

        let job_file: JobFileFormat = serde_json::from_str(&content)?;

        if job_file.version != JOB_FILE_VERSION {
            tracing::warn!(
                "Job file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                JOB_FILE_VERSION,
                job_file.version
            );
        }

        Ok(job_file.queue)
    }

    /// Write a queue snapshot to file atomically
    ///
    /// The caller must hold `io_lock`.
    async fn write_queue(&self, queue: &QueueState) -> Result<(), Error> {
        let job_file = JobFileFormat {
            version: JOB_FILE_VERSION.to_string(),
            queue: queue.clone(),
        };
        let json = serde_json::to_string_pretty(&job_file)
            .map_err(|e| Error::job_store(format!("Failed to serialize job queue: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::job_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::job_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::job_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous snapshot as backup
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::job_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Job queue written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply a mutation and persist it before anyone can observe it
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut QueueState) -> Result<T, Error> + Send,
    ) -> Result<T, Error> {
        self.mutate_if(f, |_| true).await
    }

    /// Like [`Self::mutate`], but skips the write when `changed` says the
    /// result left the queue untouched
    async fn mutate_if<T>(
        &self,
        f: impl FnOnce(&mut QueueState) -> Result<T, Error> + Send,
        changed: impl FnOnce(&T) -> bool + Send,
    ) -> Result<T, Error> {
        let _io = self.io_lock.lock().await;

        let mut next = self.queue.read().await.clone();
        let result = f(&mut next)?;
        if !changed(&result) {
            return Ok(result);
        }

        self.write_queue(&next).await?;
        *self.queue.write().await = next;
        Ok(result)
    }

    /// Restore job file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::job_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored job file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn enqueue(&self, job: ProvisioningJob) -> Result<JobId, Error> {
        self.mutate(move |queue| queue.enqueue(job)).await
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, Error> {
        let visibility = self.visibility_timeout;
        // The attempt increment must hit disk before any work starts
        self.mutate_if(
            |queue| Ok(queue.dequeue(Utc::now(), visibility)),
            |delivery| delivery.is_some(),
        )
        .await
    }

    async fn update(&self, delivery: &Delivery) -> Result<(), Error> {
        let visibility = self.visibility_timeout;
        self.mutate(|queue| queue.update(delivery, Utc::now(), visibility))
            .await
    }

    async fn ack(&self, delivery: Delivery, redeliver_after: Duration) -> Result<(), Error> {
        self.mutate(move |queue| queue.ack(&delivery, Utc::now(), redeliver_after))
            .await
    }

    async fn complete(&self, delivery: Delivery, final_state: JobState) -> Result<(), Error> {
        self.mutate(move |queue| queue.complete(&delivery, final_state, Utc::now()))
            .await
    }

    async fn get(&self, job_id: &str) -> Result<Option<ProvisioningJob>, Error> {
        Ok(self.queue.read().await.get(job_id))
    }

    async fn list(&self) -> Result<Vec<ProvisioningJob>, Error> {
        Ok(self.queue.read().await.list())
    }

    async fn sweep(&self, older_than: DateTime<Utc>) -> Result<usize, Error> {
        self.mutate_if(|queue| Ok(queue.sweep(older_than)), |removed| *removed > 0)
            .await
    }

    async fn acquire_domain_lock(
        &self,
        domain: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, Error> {
        self.mutate(|queue| Ok(queue.acquire_lock(domain, owner, ttl, Utc::now())))
            .await
    }

    async fn release_domain_lock(&self, domain: &str, owner: &str) -> Result<(), Error> {
        self.mutate(|queue| {
            queue.release_lock(domain, owner);
            Ok(())
        })
        .await
    }

    /// Rewrite the current queue
    ///
    /// Mutations are already on disk when they return; this only
    /// re-establishes the file if it went missing.
    async fn flush(&self) -> Result<(), Error> {
        let _io = self.io_lock.lock().await;
        let snapshot = self.queue.read().await.clone();
        self.write_queue(&snapshot).await
    }
}
