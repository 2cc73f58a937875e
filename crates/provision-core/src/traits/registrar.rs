// # Registrar Trait
//
// Defines the interface for purchasing domains from a registrar.
//
// ## Implementations
//
// - HTTP: `provision-http` crate (`HttpRegistrar`)
// - Tests: scripted mocks in `tests/common`

use async_trait::async_trait;

/// Outcome of a purchase call that reached the registrar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseResult {
    /// Whether the domain is now owned
    pub success: bool,
    /// Registrar-provided reason when `success` is false
    pub error: Option<String>,
}

impl PurchaseResult {
    /// A successful purchase
    pub fn purchased() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A purchase the registrar refused
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Trait for registrar implementations
///
/// # Non-Idempotency
///
/// `purchase` is a billing transaction. Calling it twice for the same
/// domain may charge twice or fail with "already owned". The worker
/// guarantees it never calls `purchase` again for a job whose purchase
/// succeeded, and never when the outcome of an earlier call is unknown.
///
/// # Error Contract
///
/// - `Ok(PurchaseResult { success: false, .. })`: the registrar answered
///   and refused (unavailable, invalid name, billing). Never retried.
/// - `Err(e)` with `e.is_retryable()`: the call did not complete
///   (timeout, 5xx, network). Retried with backoff.
///
/// Implementations must not retry internally; retry policy belongs to
/// the worker.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Purchase a domain
    ///
    /// # Parameters
    ///
    /// - `domain`: Normalized domain name
    async fn purchase(&self, domain: &str) -> Result<PurchaseResult, crate::Error>;

    /// Get the registrar name (for logging)
    fn registrar_name(&self) -> &'static str;
}
