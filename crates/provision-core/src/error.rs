//! Error types for the provisioning pipeline
//!
//! This module defines all error types used throughout the crate.
//!
//! The worker only cares about one question: can this failure succeed on a
//! later attempt? [`Error::is_retryable`] answers it.

use thiserror::Error;

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the provisioning pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Transient failure from an external service (timeout, 5xx, network)
    #[error("Retryable error from {service}: {message}")]
    RetryableExternal {
        /// Service name ("registrar", "dns", "trigger")
        service: String,
        /// Error message
        message: String,
    },

    /// Permanent failure from an external service (4xx, invalid input, unavailable)
    #[error("Terminal error from {service}: {message}")]
    TerminalExternal {
        /// Service name ("registrar", "dns", "trigger")
        service: String,
        /// Error message
        message: String,
    },

    /// DNS provider rejected or timed out on a record set write
    #[error("DNS write failed: {0}")]
    DnsWrite(String),

    /// DNS provider failed to return the current record set
    #[error("DNS read failed: {0}")]
    DnsRead(String),

    /// An external call exceeded its bounded timeout
    #[error("{service} call timed out after {secs}s")]
    Timeout {
        /// Service name
        service: String,
        /// Timeout that elapsed, in seconds
        secs: u64,
    },

    /// Another non-terminal job already targets this domain
    #[error("Domain {domain} already has an active provisioning job ({job_id})")]
    DuplicateActiveDomain {
        /// The normalized domain
        domain: String,
        /// The job currently holding the domain
        job_id: String,
    },

    /// The retry ceiling was reached while the failure was still retryable
    #[error("Attempts exhausted after {attempts} attempt(s): {last_error}")]
    AttemptsExhausted {
        /// Attempts used
        attempts: u32,
        /// The last observed error
        last_error: String,
    },

    /// The delivery's lease expired and the job belongs to someone else now
    #[error("Lease lost for job {0}")]
    LeaseLost(String),

    /// Job store errors
    #[error("Job store error: {0}")]
    JobStore(String),

    /// Job not found
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a retryable external-service error
    pub fn retryable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RetryableExternal {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a terminal external-service error
    pub fn terminal(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TerminalExternal {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a DNS write error
    pub fn dns_write(msg: impl Into<String>) -> Self {
        Self::DnsWrite(msg.into())
    }

    /// Create a DNS read error
    pub fn dns_read(msg: impl Into<String>) -> Self {
        Self::DnsRead(msg.into())
    }

    /// Create a job store error
    pub fn job_store(msg: impl Into<String>) -> Self {
        Self::JobStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether a later attempt at the same step may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetryableExternal { .. }
                | Self::DnsWrite(_)
                | Self::DnsRead(_)
                | Self::Timeout { .. }
        )
    }

    /// Whether the error comes from the job store rather than the workflow
    ///
    /// The worker cannot record these on the job, so it abandons the
    /// delivery and lets the lease expire.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::LeaseLost(_) | Self::JobStore(_) | Self::Io(_) | Self::Json(_)
        )
    }

    /// HTTP status code for the submission boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DuplicateActiveDomain { .. } => 409,
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
