// # Configuration Trigger Trait
//
// One-shot notification asking the downstream build/config system to
// reconfigure its reverse proxy for a newly mapped domain.

use async_trait::async_trait;

/// Trait for configuration trigger clients
///
/// `Ok(())` means the downstream system accepted the request (2xx).
/// Network and 5xx failures must be returned as retryable errors, other
/// 4xx responses as terminal ones.
#[async_trait]
pub trait ConfigTrigger: Send + Sync {
    /// Ask the downstream system to pick up `domain` for `project_id`
    async fn trigger(&self, domain: &str, project_id: &str) -> Result<(), crate::Error>;
}
