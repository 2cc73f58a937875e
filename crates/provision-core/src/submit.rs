//! Job submission API
//!
//! Thin library entry point used by whatever front end accepts
//! provisioning requests. Failures carry an HTTP-style status code via
//! [`Error::status_code`]: 409 for a domain that already has an active
//! job, 400 for malformed input, 500 otherwise.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::job::{JobId, ProvisioningJob};
use crate::traits::JobStore;

/// A provisioning request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub domain: String,
    pub server_ip: String,
    pub project_id: String,
}

/// Accepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Enqueues provisioning jobs
pub struct JobSubmitter {
    store: Arc<dyn JobStore>,
    max_attempts: u32,
}

impl JobSubmitter {
    pub fn new(store: Arc<dyn JobStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Validate and enqueue a request
    ///
    /// # Returns
    ///
    /// - `Ok(SubmitResponse)`: The job is queued
    /// - `Err(Error::InvalidInput)`: Bad domain, IP, or project id (400)
    /// - `Err(Error::DuplicateActiveDomain)`: The domain is already being provisioned (409)
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        let server_ip: IpAddr = request.server_ip.trim().parse().map_err(|_| {
            Error::invalid_input(format!("Invalid server IP address: {}", request.server_ip))
        })?;

        let project_id = request.project_id.trim();
        if project_id.is_empty() {
            return Err(Error::invalid_input("project_id cannot be empty"));
        }

        let job =
            ProvisioningJob::new(&request.domain, server_ip, project_id, self.max_attempts)?;
        let domain = job.domain.clone();
        let job_id = self.store.enqueue(job).await?;

        info!(job_id = %job_id, domain = %domain, "Provisioning job queued");
        Ok(SubmitResponse { job_id })
    }

    /// Current persisted state of a job
    pub async fn status(&self, job_id: &str) -> Result<ProvisioningJob> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| Error::not_found(job_id))
    }
}
