//! Minimal embedding example for provision-core
//!
//! Runs the whole pipeline in-process: an in-memory job store, a worker pool,
//! and stand-in services that answer instantly. The application owns the
//! pool lifecycle and decides when to shut it down.

use async_trait::async_trait;
use provision_core::planner::DnsRecord;
use provision_core::traits::{ConfigTrigger, DnsClient, JobStore, PurchaseResult, Registrar};
use provision_core::{
    JobSubmitter, MemoryJobStore, ProvisioningWorker, Result, RetryPolicy, SubmitRequest,
    WorkerPool, WorkerSettings,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Registrar that owns every domain it is asked for, except `.invalid`
struct EmbeddedRegistrar;

#[async_trait]
impl Registrar for EmbeddedRegistrar {
    async fn purchase(&self, domain: &str) -> Result<PurchaseResult> {
        println!("[Registrar] Purchasing {}", domain);
        if domain.ends_with(".invalid") {
            return Ok(PurchaseResult::rejected("UNAVAILABLE_DOMAIN"));
        }
        Ok(PurchaseResult::purchased())
    }

    fn registrar_name(&self) -> &'static str {
        "embedded"
    }
}

/// DNS provider that serves exactly what was written
#[derive(Default)]
struct EmbeddedDns {
    zones: Mutex<HashMap<String, Vec<DnsRecord>>>,
}

#[async_trait]
impl DnsClient for EmbeddedDns {
    async fn write(&self, domain: &str, records: &[DnsRecord]) -> Result<()> {
        println!("[DNS] Writing {} record(s) for {}", records.len(), domain);
        self.zones
            .lock()
            .await
            .insert(domain.to_string(), records.to_vec());
        Ok(())
    }

    async fn read(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        Ok(self
            .zones
            .lock()
            .await
            .get(domain)
            .cloned()
            .unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str {
        "embedded"
    }
}

struct EmbeddedTrigger;

#[async_trait]
impl ConfigTrigger for EmbeddedTrigger {
    async fn trigger(&self, domain: &str, project_id: &str) -> Result<()> {
        println!("[Trigger] Reconfiguring {} for {}", project_id, domain);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("=== Embedded provision-core Example ===\n");

    let store = Arc::new(MemoryJobStore::new());
    let settings = WorkerSettings {
        name_servers: vec!["ns1.example.net".to_string(), "ns2.example.net".to_string()],
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(20),
        ..WorkerSettings::default()
    };

    println!("1. Creating worker...");
    let (worker, mut events) = ProvisioningWorker::new(
        store.clone(),
        Arc::new(EmbeddedRegistrar),
        Arc::new(EmbeddedDns::default()),
        Arc::new(EmbeddedTrigger),
        RetryPolicy::immediate(),
        settings,
    );

    let event_listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    println!("2. Submitting jobs...");
    let submitter = JobSubmitter::new(store.clone(), 3);
    let requests = [
        ("example.com", "203.0.113.5"),
        ("example.com", "203.0.113.6"),
        ("v6.example.org", "2001:db8::5"),
        ("taken.invalid", "203.0.113.7"),
    ];
    let mut job_ids = Vec::new();
    for (domain, server_ip) in requests {
        let request = SubmitRequest {
            domain: domain.to_string(),
            server_ip: server_ip.to_string(),
            project_id: "demo-project".to_string(),
        };
        match submitter.submit(request).await {
            Ok(response) => {
                println!("   {} accepted as {}", domain, response.job_id);
                job_ids.push(response.job_id);
            }
            Err(e) => println!("   {} refused ({}): {}", domain, e.status_code(), e),
        }
    }

    println!("\n3. Starting worker pool...");
    let pool = WorkerPool::start(Arc::new(worker), 2);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let jobs = store.list().await?;
        if jobs.iter().all(|job| job.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    println!("\n4. Shutting down pool...");
    pool.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n5. Final job status:");
    for job_id in &job_ids {
        let job = submitter.status(job_id).await?;
        println!(
            "   {} -> {} after {} attempt(s){}",
            job.domain,
            job.state,
            job.attempts,
            job.last_error
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }

    println!("\n=== Embedding Successful ===");
    Ok(())
}
