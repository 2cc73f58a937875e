// # DNS Client Trait
//
// Defines the interface for replacing and reading back a domain's record set.

use async_trait::async_trait;

use crate::planner::DnsRecord;

/// Trait for DNS provider clients
///
/// Writes replace the full record set for the domain, so a retried write
/// converges on the same zone contents.
///
/// Both operations fail with retryable errors ([`crate::Error::DnsWrite`] /
/// [`crate::Error::DnsRead`]); the worker owns retry and backoff.
#[async_trait]
pub trait DnsClient: Send + Sync {
    /// Replace the record set for `domain`
    async fn write(&self, domain: &str, records: &[DnsRecord]) -> Result<(), crate::Error>;

    /// Read the record set currently served for `domain`
    async fn read(&self, domain: &str) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Get the provider name (for logging)
    fn provider_name(&self) -> &'static str;
}
