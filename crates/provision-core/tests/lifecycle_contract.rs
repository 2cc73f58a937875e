//! Contract Test: Long-Running Tasks & Durability
//!
//! This test verifies the pieces that run for the life of the daemon.
//!
//! Constraints verified:
//! - The worker pool drains the queue concurrently, one purchase per job
//! - Pool shutdown is deterministic, also when idle
//! - The sweeper removes only old terminal jobs
//! - A file-backed job resumes after a process restart without re-purchase
//! - A submission whose write failed leaves no job behind
//!
//! If this test fails, shutdown hangs or restarts lose progress.

mod common;

use common::*;
use provision_core::traits::JobStore;
use provision_core::{
    FileJobStore, JobState, JobSubmitter, MemoryJobStore, SubmitRequest, Sweeper, WorkerPool,
};
use std::sync::Arc;
use std::time::Duration;

fn request(domain: &str) -> SubmitRequest {
    SubmitRequest {
        domain: domain.to_string(),
        server_ip: "203.0.113.5".to_string(),
        project_id: "project-1".to_string(),
    }
}

async fn wait_until_terminal(store: &dyn JobStore, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let jobs = store.list().await.unwrap();
        if jobs.len() == expected && jobs.iter().all(|j| j.is_terminal()) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "jobs did not reach a terminal state in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_drains_queue_concurrently() {
    let store = Arc::new(MemoryJobStore::new());
    let services = Services::new();
    let (worker, _events) = build_worker(store.clone(), &services, fast_settings());
    let submitter = JobSubmitter::new(store.clone(), 3);

    let domains = ["a.example", "b.example", "c.example", "d.example", "e.example"];
    for domain in domains {
        submitter.submit(request(domain)).await.unwrap();
    }

    let pool = WorkerPool::start(worker, 3);
    assert_eq!(pool.size(), 3);

    wait_until_terminal(store.as_ref(), domains.len()).await;
    tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
        .await
        .expect("pool shutdown should not hang");

    let jobs = store.list().await.unwrap();
    assert!(jobs.iter().all(|j| j.state == JobState::Completed));
    assert_eq!(services.registrar.purchase_call_count(), domains.len());

    let mut purchased = services.registrar.purchased();
    purchased.sort();
    assert_eq!(purchased, domains);
}

#[tokio::test]
async fn idle_pool_shuts_down_promptly() {
    let store = Arc::new(MemoryJobStore::new());
    let services = Services::new();
    let (worker, _events) = build_worker(store.clone(), &services, fast_settings());

    let pool = WorkerPool::start(worker, 2);
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
        .await
        .expect("idle pool shutdown should not hang");
    assert_eq!(services.registrar.purchase_call_count(), 0);
}

#[tokio::test]
async fn sweeper_removes_only_old_terminal_jobs() {
    let store = Arc::new(MemoryJobStore::new());
    let services = Services::new();
    services
        .registrar
        .script([Outcome::Ok, Outcome::Reject("unavailable".to_string())]);
    let (worker, _events) = build_worker(store.clone(), &services, fast_settings());
    let submitter = JobSubmitter::new(store.clone(), 3);

    let completed = submitter.submit(request("done.example")).await.unwrap().job_id;
    let failed = submitter.submit(request("gone.example")).await.unwrap().job_id;
    drain(&worker).await;

    let active = submitter.submit(request("busy.example")).await.unwrap().job_id;

    tokio::time::sleep(Duration::from_millis(30)).await;

    let sweeper = Sweeper::new(
        store.clone(),
        Duration::from_millis(10),
        Duration::from_secs(3600),
    );
    assert_eq!(sweeper.sweep_once().await.unwrap(), 2);

    assert!(store.get(&completed).await.unwrap().is_none());
    assert!(store.get(&failed).await.unwrap().is_none());
    assert!(store.get(&active).await.unwrap().is_some());
}

#[tokio::test]
async fn file_store_restart_resumes_without_repurchase() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let visibility = Duration::from_millis(50);

    let job_id = {
        let store = Arc::new(
            FileJobStore::with_visibility_timeout(&path, visibility)
                .await
                .unwrap(),
        );
        let job_id = JobSubmitter::new(store.clone(), 3)
            .submit(request("example.com"))
            .await
            .unwrap()
            .job_id;

        // Purchase done, then the process dies before writing DNS
        let mut delivery = store.dequeue().await.unwrap().unwrap();
        delivery.job.advance(JobState::ConfiguringDns);
        store.update(&delivery).await.unwrap();
        job_id
    };

    tokio::time::sleep(Duration::from_millis(80)).await;

    let store = Arc::new(
        FileJobStore::with_visibility_timeout(&path, visibility)
            .await
            .unwrap(),
    );
    let services = Services::new();
    let (worker, _events) = build_worker(store.clone(), &services, fast_settings());

    assert_eq!(drain(&worker).await, 1);

    let job = store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(services.registrar.purchase_call_count(), 0);
    assert_eq!(services.dns.write_call_count(), 1);

    // Terminal state survives another restart
    let reopened = FileJobStore::new(&path).await.unwrap();
    assert_eq!(
        reopened.get(&job_id).await.unwrap().unwrap().state,
        JobState::Completed
    );
}

#[tokio::test]
async fn failed_submission_write_leaves_no_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    let store = Arc::new(FileJobStore::new(&path).await.unwrap());
    let services = Services::new();
    let (worker, _events) = build_worker(store.clone(), &services, fast_settings());
    let submitter = JobSubmitter::new(store.clone(), 3);

    let blocker = dir.path().join("jobs.tmp");
    std::fs::create_dir(&blocker).unwrap();

    let err = submitter.submit(request("example.com")).await.unwrap_err();
    assert_eq!(err.status_code(), 500);

    // Nothing was accepted, so nothing may be bought
    assert_eq!(drain(&worker).await, 0);
    assert_eq!(services.registrar.purchase_call_count(), 0);

    std::fs::remove_dir(&blocker).unwrap();
    let accepted = submitter.submit(request("example.com")).await.unwrap();
    assert_eq!(drain(&worker).await, 1);
    assert_eq!(
        submitter.status(&accepted.job_id).await.unwrap().state,
        JobState::Completed
    );
    assert_eq!(services.registrar.purchase_call_count(), 1);
}
