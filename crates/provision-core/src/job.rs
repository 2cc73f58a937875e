// # Provisioning Job
//
// The unit of work carried through the queue: one request to provision a
// single domain end-to-end.
//
// ## State Machine
//
// ```text
// Queued ──▶ Purchasing ──▶ ConfiguringDns ──▶ Verifying ──▶ Completed
//   ▲            │                │                │
//   └─(retry)────┘                └──────┬─────────┘
//                                        ▼
//                                      Failed
// ```
//
// Retries re-enter at the step that failed. `Queued` is the only state a
// retry moves back to, and only while the purchase has not succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Job identifier (UUID v4, assigned at enqueue time)
pub type JobId = String;

/// Default ceiling on execution attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Provisioning job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for (re)delivery; purchase not yet successful
    Queued,
    /// Purchase call in flight
    Purchasing,
    /// Domain owned; DNS record set being written
    ConfiguringDns,
    /// Records written; waiting for propagation and the config trigger
    Verifying,
    /// Terminal: provisioned and downstream notified
    Completed,
    /// Terminal: gave up, see `last_error`
    Failed,
}

impl JobState {
    /// Whether no further transitions can occur
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether the purchase step has already succeeded
    pub fn is_purchased(self) -> bool {
        matches!(
            self,
            JobState::ConfiguringDns | JobState::Verifying | JobState::Completed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Purchasing => "purchasing",
            JobState::ConfiguringDns => "configuring_dns",
            JobState::Verifying => "verifying",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A domain provisioning job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningJob {
    /// Immutable job identifier
    pub id: JobId,
    /// Normalized fully-qualified domain name
    pub domain: String,
    /// Address the domain must resolve to
    pub server_ip: IpAddr,
    /// Owning project (carried through to the config trigger)
    pub project_id: String,
    /// Current state
    pub state: JobState,
    /// Deliveries so far
    pub attempts: u32,
    /// Attempt ceiling
    pub max_attempts: u32,
    /// Most recent failure, cleared on progress
    pub last_error: Option<String>,
    /// Enqueue time
    pub created_at: DateTime<Utc>,
    /// Last persisted write
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningJob {
    /// Create a new queued job with a fresh id
    ///
    /// The domain is normalized and validated; use [`normalize_domain`]
    /// directly to check input without building a job.
    pub fn new(
        domain: &str,
        server_ip: IpAddr,
        project_id: impl Into<String>,
        max_attempts: u32,
    ) -> Result<Self> {
        let domain = normalize_domain(domain)?;
        if max_attempts == 0 {
            return Err(Error::invalid_input("max_attempts must be at least 1"));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain,
            server_ip,
            project_id: project_id.into(),
            state: JobState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the attempt budget is used up
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Move to a new non-error state, clearing the last error
    pub fn advance(&mut self, state: JobState) {
        self.state = state;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Record a failure without changing state
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

/// Normalize a domain name: trim, lower-case, drop a trailing root dot
///
/// Validation follows RFC 1035 label rules: at least two labels, each
/// 1..=63 characters of ASCII alphanumerics and hyphens, not starting or
/// ending with a hyphen, 253 characters total.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();

    if domain.is_empty() {
        return Err(Error::invalid_input("Domain name cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(Error::invalid_input(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::invalid_input(format!(
            "Domain name must be fully qualified: '{}'",
            domain
        )));
    }

    for label in labels {
        if label.is_empty() {
            return Err(Error::invalid_input(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(Error::invalid_input(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::invalid_input(format!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_input(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  Example.COM ").unwrap(), "example.com");
        assert_eq!(normalize_domain("shop.example.com.").unwrap(), "shop.example.com");
        assert_eq!(normalize_domain("my-site.io").unwrap(), "my-site.io");
    }

    #[test]
    fn test_normalize_domain_rejects_invalid() {
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("   ").is_err());
        assert!(normalize_domain("localhost").is_err());
        assert!(normalize_domain("bad..example.com").is_err());
        assert!(normalize_domain("-bad.example.com").is_err());
        assert!(normalize_domain("under_score.com").is_err());
        assert!(normalize_domain(&format!("{}.com", "a".repeat(64))).is_err());
    }

    #[test]
    fn test_new_job_defaults() {
        let job = ProvisioningJob::new(
            "Example.com",
            "203.0.113.5".parse().unwrap(),
            "project-1",
            DEFAULT_MAX_ATTEMPTS,
        )
        .unwrap();

        assert_eq!(job.domain, "example.com");
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert!(job.last_error.is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_advance_clears_last_error() {
        let mut job =
            ProvisioningJob::new("example.com", "203.0.113.5".parse().unwrap(), "p", 3).unwrap();
        job.record_error("registrar timeout");
        assert!(job.last_error.is_some());

        job.advance(JobState::ConfiguringDns);
        assert_eq!(job.state, JobState::ConfiguringDns);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_state_helpers() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Verifying.is_terminal());

        assert!(!JobState::Queued.is_purchased());
        assert!(!JobState::Purchasing.is_purchased());
        assert!(JobState::ConfiguringDns.is_purchased());
        assert_eq!(JobState::ConfiguringDns.to_string(), "configuring_dns");
    }
}
