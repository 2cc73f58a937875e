//! Configuration types for the provisioning pipeline
//!
//! This module defines all configuration structures used throughout the crate.
//! Every field has a default so a partial document (or an empty one) is a
//! usable configuration; `validate()` rejects the combinations that are not.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::job::DEFAULT_MAX_ATTEMPTS;
use crate::planner::DEFAULT_RECORD_TTL;

/// Main provisioning configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Job store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Queue delivery settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Retry/backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Housekeeping settings
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Registrar service endpoint
    #[serde(default)]
    pub registrar: EndpointConfig,

    /// DNS provider endpoint
    #[serde(default)]
    pub dns: EndpointConfig,

    /// Configuration trigger endpoint
    #[serde(default)]
    pub trigger: EndpointConfig,
}

impl ProvisionConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.queue.validate()?;
        self.retry.validate()?;
        self.worker.validate()?;
        self.sweeper.validate()?;
        self.registrar.validate("registrar")?;
        self.dns.validate("dns")?;
        self.trigger.validate("trigger")?;
        Ok(())
    }
}

/// Job store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based job store
    File {
        /// Path to the job file
        path: String,
    },

    /// In-memory job store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Job store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
        }
    }
}

/// Queue delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long a dequeued job stays invisible to other workers (seconds)
    ///
    /// A worker that crashes mid-job loses its lease after this long and
    /// the job is delivered again.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Idle wait between polls when the queue is empty (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    /// Validate the queue settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.visibility_timeout_secs == 0 {
            return Err(crate::Error::config("Visibility timeout must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        Ok(())
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Retry/backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of execution attempts per job
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor applied per additional attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound on any single backoff delay (seconds)
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl RetryConfig {
    /// Validate the retry settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("max_attempts must be >= 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(crate::Error::config("Backoff multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Name servers written as apex NS records
    #[serde(default)]
    pub name_servers: Vec<String>,

    /// TTL for every planned record (seconds)
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,

    /// Wait before the first verification read, and between reads (seconds)
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Verification reads per delivery before giving up on this attempt
    #[serde(default = "default_verify_rounds")]
    pub verify_rounds: u32,

    /// Bound on every external call (seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// How long the per-domain purchase lock is held at most (seconds)
    #[serde(default = "default_domain_lock_ttl_secs")]
    pub domain_lock_ttl_secs: u64,

    /// Capacity of the worker event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl WorkerConfig {
    /// Validate the worker settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.concurrency == 0 {
            return Err(crate::Error::config("Worker concurrency must be >= 1"));
        }
        if self.verify_rounds == 0 {
            return Err(crate::Error::config("verify_rounds must be >= 1"));
        }
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("Call timeout must be > 0"));
        }
        // The lock must outlive the purchase call it guards
        if self.domain_lock_ttl_secs <= self.call_timeout_secs {
            return Err(crate::Error::config(format!(
                "Domain lock TTL ({}s) must be longer than the call timeout ({}s)",
                self.domain_lock_ttl_secs, self.call_timeout_secs
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.name_servers.iter().any(|ns| ns.trim().is_empty()) {
            return Err(crate::Error::config("Name server entries cannot be empty"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            name_servers: Vec::new(),
            record_ttl: default_record_ttl(),
            settle_delay_secs: default_settle_delay_secs(),
            verify_rounds: default_verify_rounds(),
            call_timeout_secs: default_call_timeout_secs(),
            domain_lock_ttl_secs: default_domain_lock_ttl_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Housekeeping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Interval between sweeps (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,

    /// Terminal jobs older than this are removed (seconds)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl SweeperConfig {
    /// Validate the sweeper settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Sweep interval must be > 0"));
        }
        Ok(())
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

/// External service endpoint
///
/// `Debug` never prints the token.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL (registrar, DNS) or full URL (trigger)
    #[serde(default)]
    pub base_url: String,

    /// Bearer token, sent as `Authorization: Bearer <token>`
    #[serde(default)]
    pub api_token: Option<String>,

    /// HTTP client timeout (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    /// Create an endpoint without a token
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Validate the endpoint; `service` names it in the error message
    pub fn validate(&self, service: &str) -> Result<(), crate::Error> {
        if self.base_url.trim().is_empty() {
            return Ok(());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "{} URL must start with http:// or https://",
                service
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config(format!(
                "{} timeout must be > 0",
                service
            )));
        }
        if self.api_token.as_deref().is_some_and(|t| t.is_empty()) {
            return Err(crate::Error::config(format!(
                "{} API token cannot be empty when set",
                service
            )));
        }
        Ok(())
    }

    /// Whether a URL has been configured
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_visibility_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    4
}

fn default_record_ttl() -> u32 {
    DEFAULT_RECORD_TTL
}

fn default_settle_delay_secs() -> u64 {
    30
}

fn default_verify_rounds() -> u32 {
    3
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_domain_lock_ttl_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_retention_secs() -> u64 {
    86_400
}

fn default_http_timeout_secs() -> u64 {
    30
}
