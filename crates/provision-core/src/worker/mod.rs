//! Provisioning worker
//!
//! The worker drives one delivered job through the provisioning workflow:
//! purchase the domain, write its DNS record set, verify propagation, and
//! notify the configuration trigger.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────┐
//!   JobStore ─dequeue─▶│  ProvisioningWorker  │─── WorkerEvent ──▶ monitor
//!      ▲               └──────────────────────┘
//!      │                   │        │       │
//!      │ update/ack/       ▼        ▼       ▼
//!      │ complete     Registrar  DnsClient  ConfigTrigger
//!      └───────────────────┘
//! ```
//!
//! ## Delivery Flow
//!
//! 1. Dequeue a job (the store increments `attempts` with the lease)
//! 2. Run the step for the persisted state, persisting every transition
//! 3. On success, mark the job `Completed`
//! 4. On a retryable failure, ack with backoff so it is redelivered later
//! 5. On a terminal failure or an exhausted budget, mark the job `Failed`
//!
//! Every delivery starts from the persisted job. A redelivery therefore
//! resumes at the step that failed, and a job whose purchase succeeded is
//! never purchased again.

pub mod pool;
pub mod retry;

pub use pool::WorkerPool;
pub use retry::RetryPolicy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::job::{JobId, JobState, ProvisioningJob};
use crate::planner::{self, DnsRecord};
use crate::traits::{ConfigTrigger, Delivery, DnsClient, JobStore, Registrar};

/// Events emitted by the ProvisioningWorker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A delivery started
    JobStarted {
        job_id: JobId,
        domain: String,
        attempt: u32,
        state: JobState,
    },

    /// A transition was persisted
    StateChanged {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },

    /// A step failed
    StepFailed {
        job_id: JobId,
        state: JobState,
        error: String,
        retryable: bool,
    },

    /// The job was acked for redelivery
    RetryScheduled {
        job_id: JobId,
        attempt: u32,
        delay: Duration,
    },

    /// Terminal success
    JobCompleted { job_id: JobId, domain: String },

    /// Terminal failure
    JobFailed {
        job_id: JobId,
        domain: String,
        error: String,
    },

    /// The delivery could not be recorded and was left to expire
    DeliveryAbandoned { job_id: JobId, error: String },
}

/// Per-worker tuning, usually derived from [`ProvisionConfig`]
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Name servers for the planned NS records
    pub name_servers: Vec<String>,
    /// TTL for planned records
    pub record_ttl: u32,
    /// Wait before the first verification read and between reads
    pub settle_delay: Duration,
    /// Verification reads per delivery
    pub verify_rounds: u32,
    /// Bound on every external call
    pub call_timeout: Duration,
    /// Purchase lock lifetime
    pub domain_lock_ttl: Duration,
    /// Idle wait between polls
    pub poll_interval: Duration,
    /// Worker event channel capacity
    pub event_channel_capacity: usize,
}

impl WorkerSettings {
    /// Build settings from configuration
    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self {
            name_servers: config.worker.name_servers.clone(),
            record_ttl: config.worker.record_ttl,
            settle_delay: Duration::from_secs(config.worker.settle_delay_secs),
            verify_rounds: config.worker.verify_rounds,
            call_timeout: Duration::from_secs(config.worker.call_timeout_secs),
            domain_lock_ttl: Duration::from_secs(config.worker.domain_lock_ttl_secs),
            poll_interval: config.queue.poll_interval(),
            event_channel_capacity: config.worker.event_channel_capacity,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&ProvisionConfig::default())
    }
}

/// Provisioning worker
///
/// Holds shared handles to the job store and the external service clients.
/// One worker is shared by every task of a [`WorkerPool`]; all state lives
/// in the job store.
pub struct ProvisioningWorker {
    store: Arc<dyn JobStore>,
    registrar: Arc<dyn Registrar>,
    dns: Arc<dyn DnsClient>,
    trigger: Arc<dyn ConfigTrigger>,
    policy: RetryPolicy,
    settings: WorkerSettings,
    event_tx: mpsc::Sender<WorkerEvent>,
}

impl ProvisioningWorker {
    /// Create a new worker
    ///
    /// # Returns
    ///
    /// A tuple of (worker, event_receiver) where event_receiver yields worker events
    pub fn new(
        store: Arc<dyn JobStore>,
        registrar: Arc<dyn Registrar>,
        dns: Arc<dyn DnsClient>,
        trigger: Arc<dyn ConfigTrigger>,
        policy: RetryPolicy,
        settings: WorkerSettings,
    ) -> (Self, mpsc::Receiver<WorkerEvent>) {
        let (tx, rx) = mpsc::channel(settings.event_channel_capacity.max(1));

        let worker = Self {
            store,
            registrar,
            dns,
            trigger,
            policy,
            settings,
            event_tx: tx,
        };

        (worker, rx)
    }

    /// Dequeue and process one job
    ///
    /// # Returns
    ///
    /// - `Ok(Some(job_id))`: A delivery was processed (whatever its outcome)
    /// - `Ok(None)`: Nothing was runnable
    /// - `Err(Error)`: The job store failed; the delivery, if any, was abandoned
    pub async fn process_next(&self, worker_id: usize) -> Result<Option<JobId>> {
        let Some(mut delivery) = self.store.dequeue().await? else {
            return Ok(None);
        };
        let job_id = delivery.job.id.clone();

        if delivery.is_exhausted() {
            let reason = delivery
                .job
                .last_error
                .clone()
                .unwrap_or_else(|| "delivery expired on the final attempt".to_string());
            let error = Error::AttemptsExhausted {
                attempts: delivery.job.attempts,
                last_error: reason.clone(),
            };
            error!(job_id = %job_id, domain = %delivery.job.domain, "{}", error);
            self.fail(delivery, reason).await?;
            return Ok(Some(job_id));
        }

        info!(
            worker = worker_id,
            job_id = %job_id,
            domain = %delivery.job.domain,
            "Processing attempt {}/{} in state {}",
            delivery.job.attempts,
            delivery.job.max_attempts,
            delivery.job.state
        );
        self.emit_event(WorkerEvent::JobStarted {
            job_id: job_id.clone(),
            domain: delivery.job.domain.clone(),
            attempt: delivery.job.attempts,
            state: delivery.job.state,
        });

        match self.execute(&mut delivery).await {
            Ok(()) => {
                let domain = delivery.job.domain.clone();
                self.store.complete(delivery, JobState::Completed).await?;
                info!(job_id = %job_id, domain = %domain, "Provisioning completed");
                self.emit_event(WorkerEvent::JobCompleted {
                    job_id: job_id.clone(),
                    domain,
                });
            }
            Err(e) if e.is_infrastructure() => {
                warn!(
                    job_id = %job_id,
                    "Abandoning delivery, job will be redelivered after its lease expires: {}",
                    e
                );
                self.emit_event(WorkerEvent::DeliveryAbandoned {
                    job_id: job_id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
            Err(e) => self.handle_failure(delivery, e).await?,
        }

        Ok(Some(job_id))
    }

    /// Run the poll loop until `shutdown` fires
    ///
    /// A delivery in progress finishes before the signal is observed.
    pub async fn run(&self, worker_id: usize, mut shutdown: broadcast::Receiver<()>) {
        debug!(worker = worker_id, "Worker started");

        loop {
            match self.process_next(worker_id).await {
                Ok(Some(_)) => {
                    // Keep draining, but never miss a pending shutdown
                    if !matches!(
                        shutdown.try_recv(),
                        Err(broadcast::error::TryRecvError::Empty)
                    ) {
                        break;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker = worker_id, "Job processing failed: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        debug!(worker = worker_id, "Worker stopped");
    }

    /// Drive the delivered job until it needs a terminal transition
    async fn execute(&self, delivery: &mut Delivery) -> Result<()> {
        let mut entered_verifying = false;

        loop {
            match delivery.job.state {
                JobState::Queued => self.purchase(delivery).await?,
                JobState::Purchasing => {
                    // The previous delivery died mid-call: the domain may be ours
                    return Err(Error::terminal(
                        "registrar",
                        "purchase outcome unknown after an interrupted delivery",
                    ));
                }
                JobState::ConfiguringDns => {
                    self.configure_dns(delivery).await?;
                    entered_verifying = true;
                }
                JobState::Verifying => {
                    self.verify(delivery, entered_verifying).await?;
                    self.notify_trigger(&delivery.job).await?;
                    return Ok(());
                }
                JobState::Completed | JobState::Failed => return Ok(()),
            }
        }
    }

    /// Queued → Purchasing → ConfiguringDns
    async fn purchase(&self, delivery: &mut Delivery) -> Result<()> {
        let domain = delivery.job.domain.clone();
        let owner = delivery.receipt().to_string();

        if !self
            .store
            .acquire_domain_lock(&domain, &owner, self.settings.domain_lock_ttl)
            .await?
        {
            return Err(Error::retryable(
                "registrar",
                format!("purchase of {} already in progress elsewhere", domain),
            ));
        }

        self.transition(delivery, JobState::Purchasing).await?;

        info!(
            job_id = %delivery.job.id,
            domain = %domain,
            "Purchasing domain via {}",
            self.registrar.registrar_name()
        );
        let outcome = self.call("registrar", self.registrar.purchase(&domain)).await;

        if let Err(e) = self.store.release_domain_lock(&domain, &owner).await {
            warn!(domain = %domain, "Failed to release purchase lock: {}", e);
        }

        match outcome {
            Ok(result) if result.success => {
                self.transition(delivery, JobState::ConfiguringDns).await
            }
            Ok(result) => Err(Error::terminal(
                "registrar",
                result
                    .error
                    .unwrap_or_else(|| "purchase rejected".to_string()),
            )),
            Err(e) => {
                if e.is_retryable() {
                    // Not bought; the next delivery starts over
                    delivery.job.state = JobState::Queued;
                }
                Err(e)
            }
        }
    }

    /// ConfiguringDns → Verifying
    async fn configure_dns(&self, delivery: &mut Delivery) -> Result<()> {
        let records = self.plan(&delivery.job);
        debug!(
            job_id = %delivery.job.id,
            domain = %delivery.job.domain,
            "Writing {} records via {}",
            records.len(),
            self.dns.provider_name()
        );

        self.call("dns", self.dns.write(&delivery.job.domain, &records))
            .await?;
        self.transition(delivery, JobState::Verifying).await
    }

    /// Read the record set back until it matches the plan
    async fn verify(&self, delivery: &mut Delivery, settle_first: bool) -> Result<()> {
        let planned = self.plan(&delivery.job);
        let rounds = self.settings.verify_rounds.max(1);
        let mut last_mismatch = None;

        for round in 1..=rounds {
            if round > 1 || settle_first {
                tokio::time::sleep(self.settings.settle_delay).await;
            }

            let observed = self.call("dns", self.dns.read(&delivery.job.domain)).await?;
            match planner::check_propagation(&planned, &observed) {
                Ok(()) => {
                    debug!(job_id = %delivery.job.id, round, "Records verified");
                    return Ok(());
                }
                Err(mismatch) => {
                    debug!(job_id = %delivery.job.id, round, "{}", mismatch);
                    last_mismatch = Some(mismatch);
                    // Keep the lease alive across settle delays
                    self.store.update(delivery).await?;
                }
            }
        }

        let detail = last_mismatch
            .map(|m| m.to_string())
            .unwrap_or_else(|| "no verification read".to_string());
        Err(Error::retryable(
            "dns",
            format!("verification failed after {} read(s): {}", rounds, detail),
        ))
    }

    async fn notify_trigger(&self, job: &ProvisioningJob) -> Result<()> {
        self.call("trigger", self.trigger.trigger(&job.domain, &job.project_id))
            .await?;
        debug!(job_id = %job.id, domain = %job.domain, "Configuration trigger accepted");
        Ok(())
    }

    /// Retry with backoff, or give up
    async fn handle_failure(&self, mut delivery: Delivery, error: Error) -> Result<()> {
        let job_id = delivery.job.id.clone();
        let attempt = delivery.job.attempts;
        let retryable = error.is_retryable();

        delivery.job.record_error(error.to_string());
        self.emit_event(WorkerEvent::StepFailed {
            job_id: job_id.clone(),
            state: delivery.job.state,
            error: error.to_string(),
            retryable,
        });

        if retryable && !delivery.job.attempts_exhausted() {
            let delay = self.policy.delay_for(attempt);
            warn!(
                job_id = %job_id,
                domain = %delivery.job.domain,
                "Attempt {}/{} failed in state {}, retrying in {:?}: {}",
                attempt,
                delivery.job.max_attempts,
                delivery.job.state,
                delay,
                error
            );
            self.store.ack(delivery, delay).await?;
            self.emit_event(WorkerEvent::RetryScheduled {
                job_id,
                attempt,
                delay,
            });
            return Ok(());
        }

        let reason = if retryable {
            Error::AttemptsExhausted {
                attempts: attempt,
                last_error: error.to_string(),
            }
        } else {
            error
        };
        error!(
            job_id = %job_id,
            domain = %delivery.job.domain,
            "Provisioning failed in state {}: {}",
            delivery.job.state,
            reason
        );

        self.fail(delivery, last_observed(&reason)).await
    }

    async fn fail(&self, mut delivery: Delivery, last_error: String) -> Result<()> {
        let job_id = delivery.job.id.clone();
        let domain = delivery.job.domain.clone();

        delivery.job.record_error(last_error.clone());
        self.store.complete(delivery, JobState::Failed).await?;
        self.emit_event(WorkerEvent::JobFailed {
            job_id,
            domain,
            error: last_error,
        });
        Ok(())
    }

    /// Persist a transition, extending the lease
    async fn transition(&self, delivery: &mut Delivery, to: JobState) -> Result<()> {
        let from = delivery.job.state;
        delivery.job.advance(to);
        self.store.update(delivery).await?;

        debug!(job_id = %delivery.job.id, "{} -> {}", from, to);
        self.emit_event(WorkerEvent::StateChanged {
            job_id: delivery.job.id.clone(),
            from,
            to,
        });
        Ok(())
    }

    fn plan(&self, job: &ProvisioningJob) -> Vec<DnsRecord> {
        planner::plan_with_ttl(
            job.server_ip,
            &self.settings.name_servers,
            self.settings.record_ttl,
        )
    }

    /// Run an external call under the configured timeout
    async fn call<T>(&self, service: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                service: service.to_string(),
                secs: self.settings.call_timeout.as_secs(),
            }),
        }
    }

    /// Emit a worker event
    fn emit_event(&self, event: WorkerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Worker event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            // Nobody listens
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// The underlying failure, without the exhaustion wrapper
fn last_observed(error: &Error) -> String {
    match error {
        Error::AttemptsExhausted { last_error, .. } => last_error.clone(),
        other => other.to_string(),
    }
}
