//! Core traits for the provisioning pipeline
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Registrar`]: Purchase domains
//! - [`DnsClient`]: Write and read back DNS record sets
//! - [`ConfigTrigger`]: Notify the downstream configuration system
//! - [`JobStore`]: Durable job queue with at-least-once delivery

pub mod config_trigger;
pub mod dns_client;
pub mod job_store;
pub mod registrar;

pub use config_trigger::ConfigTrigger;
pub use dns_client::DnsClient;
pub use job_store::{Delivery, JobStore};
pub use registrar::{PurchaseResult, Registrar};
