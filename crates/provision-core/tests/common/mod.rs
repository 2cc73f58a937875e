//! Test doubles and common utilities for pipeline contract tests
//!
//! The mocks count their calls and can be scripted to fail, so tests can
//! assert on side effects (how many purchases, which records were written)
//! rather than on log output.

#![allow(dead_code)]

use provision_core::error::{Error, Result};
use provision_core::planner::DnsRecord;
use provision_core::traits::{ConfigTrigger, DnsClient, JobStore, PurchaseResult, Registrar};
use provision_core::worker::{ProvisioningWorker, RetryPolicy, WorkerEvent, WorkerSettings};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted result for one external call
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Call succeeds
    Ok,
    /// Service answers with a rejection (terminal)
    Reject(String),
    /// Transient failure (retryable)
    Transient(String),
    /// Call never returns within any reasonable timeout
    Hang,
}

fn next_outcome(script: &Mutex<VecDeque<Outcome>>) -> Outcome {
    script.lock().unwrap().pop_front().unwrap_or(Outcome::Ok)
}

async fn hang() {
    tokio::time::sleep(Duration::from_secs(3600)).await;
}

/// A registrar that counts purchases and follows a script
pub struct MockRegistrar {
    purchase_call_count: Arc<AtomicUsize>,
    purchased: Arc<Mutex<Vec<String>>>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
}

impl MockRegistrar {
    pub fn new() -> Self {
        Self {
            purchase_call_count: Arc::new(AtomicUsize::new(0)),
            purchased: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue outcomes for the next purchase calls (then: success)
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Get the number of times purchase() was called
    pub fn purchase_call_count(&self) -> usize {
        self.purchase_call_count.load(Ordering::SeqCst)
    }

    /// Domains whose purchase succeeded
    pub fn purchased(&self) -> Vec<String> {
        self.purchased.lock().unwrap().clone()
    }

    /// Create a new MockRegistrar that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            purchase_call_count: Arc::clone(&other.purchase_call_count),
            purchased: Arc::clone(&other.purchased),
            script: Arc::clone(&other.script),
        }
    }
}

#[async_trait::async_trait]
impl Registrar for MockRegistrar {
    async fn purchase(&self, domain: &str) -> Result<PurchaseResult> {
        self.purchase_call_count.fetch_add(1, Ordering::SeqCst);

        match next_outcome(&self.script) {
            Outcome::Ok => {
                self.purchased.lock().unwrap().push(domain.to_string());
                Ok(PurchaseResult::purchased())
            }
            Outcome::Reject(reason) => Ok(PurchaseResult::rejected(reason)),
            Outcome::Transient(message) => Err(Error::retryable("registrar", message)),
            Outcome::Hang => {
                hang().await;
                Ok(PurchaseResult::purchased())
            }
        }
    }

    fn registrar_name(&self) -> &'static str {
        "mock-registrar"
    }
}

/// An in-memory DNS provider that counts calls
///
/// Written records become readable after `read_lag` further reads, which
/// simulates propagation delay.
pub struct MockDnsClient {
    write_call_count: Arc<AtomicUsize>,
    read_call_count: Arc<AtomicUsize>,
    zones: Arc<Mutex<HashMap<String, Vec<DnsRecord>>>>,
    write_script: Arc<Mutex<VecDeque<Outcome>>>,
    read_script: Arc<Mutex<VecDeque<Outcome>>>,
    read_lag: Arc<AtomicUsize>,
}

impl MockDnsClient {
    pub fn new() -> Self {
        Self {
            write_call_count: Arc::new(AtomicUsize::new(0)),
            read_call_count: Arc::new(AtomicUsize::new(0)),
            zones: Arc::new(Mutex::new(HashMap::new())),
            write_script: Arc::new(Mutex::new(VecDeque::new())),
            read_script: Arc::new(Mutex::new(VecDeque::new())),
            read_lag: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue outcomes for the next write calls (then: success)
    pub fn script_writes(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.write_script.lock().unwrap().extend(outcomes);
    }

    /// Queue outcomes for the next read calls (then: success)
    pub fn script_reads(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.read_script.lock().unwrap().extend(outcomes);
    }

    /// The next `reads` successful reads return an empty record set
    pub fn set_read_lag(&self, reads: usize) {
        self.read_lag.store(reads, Ordering::SeqCst);
    }

    /// Get the number of times write() was called
    pub fn write_call_count(&self) -> usize {
        self.write_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times read() was called
    pub fn read_call_count(&self) -> usize {
        self.read_call_count.load(Ordering::SeqCst)
    }

    /// Records currently stored for a domain
    pub fn records(&self, domain: &str) -> Vec<DnsRecord> {
        self.zones
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite a zone directly (e.g. to simulate a provider serving other data)
    pub fn set_records(&self, domain: &str, records: Vec<DnsRecord>) {
        self.zones
            .lock()
            .unwrap()
            .insert(domain.to_string(), records);
    }

    /// Create a new MockDnsClient that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            write_call_count: Arc::clone(&other.write_call_count),
            read_call_count: Arc::clone(&other.read_call_count),
            zones: Arc::clone(&other.zones),
            write_script: Arc::clone(&other.write_script),
            read_script: Arc::clone(&other.read_script),
            read_lag: Arc::clone(&other.read_lag),
        }
    }
}

#[async_trait::async_trait]
impl DnsClient for MockDnsClient {
    async fn write(&self, domain: &str, records: &[DnsRecord]) -> Result<()> {
        self.write_call_count.fetch_add(1, Ordering::SeqCst);

        match next_outcome(&self.write_script) {
            Outcome::Ok => {
                self.set_records(domain, records.to_vec());
                Ok(())
            }
            Outcome::Reject(message) => Err(Error::terminal("dns", message)),
            Outcome::Transient(message) => Err(Error::dns_write(message)),
            Outcome::Hang => {
                hang().await;
                Ok(())
            }
        }
    }

    async fn read(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        self.read_call_count.fetch_add(1, Ordering::SeqCst);

        match next_outcome(&self.read_script) {
            Outcome::Ok => {}
            Outcome::Reject(message) | Outcome::Transient(message) => {
                return Err(Error::dns_read(message));
            }
            Outcome::Hang => hang().await,
        }

        let lagging = self
            .read_lag
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lagging {
            return Ok(Vec::new());
        }
        Ok(self.records(domain))
    }

    fn provider_name(&self) -> &'static str {
        "mock-dns"
    }
}

/// A configuration trigger that records its calls
pub struct MockTrigger {
    trigger_call_count: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
}

impl MockTrigger {
    pub fn new() -> Self {
        Self {
            trigger_call_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue outcomes for the next trigger calls (then: success)
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Get the number of times trigger() was called
    pub fn trigger_call_count(&self) -> usize {
        self.trigger_call_count.load(Ordering::SeqCst)
    }

    /// Successful (domain, project_id) calls
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Create a new MockTrigger that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            trigger_call_count: Arc::clone(&other.trigger_call_count),
            calls: Arc::clone(&other.calls),
            script: Arc::clone(&other.script),
        }
    }
}

#[async_trait::async_trait]
impl ConfigTrigger for MockTrigger {
    async fn trigger(&self, domain: &str, project_id: &str) -> Result<()> {
        self.trigger_call_count.fetch_add(1, Ordering::SeqCst);

        match next_outcome(&self.script) {
            Outcome::Ok => {
                self.calls
                    .lock()
                    .unwrap()
                    .push((domain.to_string(), project_id.to_string()));
                Ok(())
            }
            Outcome::Reject(message) => Err(Error::terminal("trigger", message)),
            Outcome::Transient(message) => Err(Error::retryable("trigger", message)),
            Outcome::Hang => {
                hang().await;
                Ok(())
            }
        }
    }
}

/// The three mocked services, handed to tests while the worker owns copies
pub struct Services {
    pub registrar: MockRegistrar,
    pub dns: MockDnsClient,
    pub trigger: MockTrigger,
}

impl Services {
    pub fn new() -> Self {
        Self {
            registrar: MockRegistrar::new(),
            dns: MockDnsClient::new(),
            trigger: MockTrigger::new(),
        }
    }
}

/// Worker settings with no waiting, for tests
pub fn fast_settings() -> WorkerSettings {
    WorkerSettings {
        name_servers: vec!["ns1.example.com".to_string(), "ns2.example.com".to_string()],
        record_ttl: 3600,
        settle_delay: Duration::ZERO,
        verify_rounds: 3,
        call_timeout: Duration::from_secs(1),
        domain_lock_ttl: Duration::from_secs(60),
        poll_interval: Duration::from_millis(10),
        event_channel_capacity: 100,
    }
}

/// Build a worker over `store` whose services share counters with `services`
pub fn build_worker(
    store: Arc<dyn JobStore>,
    services: &Services,
    settings: WorkerSettings,
) -> (Arc<ProvisioningWorker>, mpsc::Receiver<WorkerEvent>) {
    let (worker, events) = ProvisioningWorker::new(
        store,
        Arc::new(MockRegistrar::sharing_counters_with(&services.registrar)),
        Arc::new(MockDnsClient::sharing_counters_with(&services.dns)),
        Arc::new(MockTrigger::sharing_counters_with(&services.trigger)),
        RetryPolicy::immediate(),
        settings,
    );
    (Arc::new(worker), events)
}

/// Process deliveries until the queue has nothing runnable
pub async fn drain(worker: &ProvisioningWorker) -> usize {
    let mut processed = 0;
    while worker.process_next(0).await.unwrap().is_some() {
        processed += 1;
    }
    processed
}

/// Collect every event currently buffered
pub fn collect_events(rx: &mut mpsc::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
