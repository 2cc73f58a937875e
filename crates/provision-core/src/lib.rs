// # provision-core
//
// Core library for the domain provisioning job pipeline.
//
// ## Architecture Overview
//
// This library provides everything needed to provision a domain end-to-end:
// - **Registrar**: Trait for purchasing a domain
// - **DnsClient**: Trait for writing and reading back DNS record sets
// - **ConfigTrigger**: Trait for notifying the downstream configuration system
// - **JobStore**: Trait for the durable, at-least-once job queue
// - **ProvisioningWorker**: State machine that drives a job from purchase to completion
// - **WorkerPool** / **Sweeper**: Long-running tasks sharing one shutdown signal
// - **JobSubmitter**: Entry point that validates and enqueues requests
//
// ## Design Principles
//
// 1. **Durable Progress**: Every state transition is persisted before the next step
// 2. **Resume, Don't Repeat**: Redelivery re-enters at the failed step; a purchase is never repeated
// 3. **Library-First**: HTTP clients and the daemon live in separate crates

pub mod config;
pub mod error;
pub mod job;
pub mod planner;
pub mod store;
pub mod submit;
pub mod sweeper;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{EndpointConfig, ProvisionConfig, StoreConfig};
pub use error::{Error, Result};
pub use job::{JobId, JobState, ProvisioningJob};
pub use planner::{DnsRecord, RecordType};
pub use store::{FileJobStore, MemoryJobStore};
pub use submit::{JobSubmitter, SubmitRequest, SubmitResponse};
pub use sweeper::Sweeper;
pub use traits::{ConfigTrigger, Delivery, DnsClient, JobStore, PurchaseResult, Registrar};
pub use worker::{ProvisioningWorker, RetryPolicy, WorkerEvent, WorkerPool, WorkerSettings};
