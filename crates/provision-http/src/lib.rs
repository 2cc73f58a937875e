// # HTTP Service Clients
//
// reqwest-based implementations of the external service traits used by the
// provisioning worker:
//
// - `HttpRegistrar`: `Registrar` (purchase) plus subaccount lookups
// - `HttpDnsClient`: `DnsClient` (replace and read back a record set)
// - `HttpConfigTrigger`: `ConfigTrigger` (one-shot reconfiguration request)
//
// ## Error Classification
//
// Clients make exactly one HTTP request per call and never retry; the
// worker owns retries and backoff.
//
// | Outcome                          | Error                     |
// |----------------------------------|---------------------------|
// | network error, client timeout    | retryable                 |
// | 408, 429, 5xx                    | retryable                 |
// | other 4xx                        | terminal (registrar: rejection result) |
//
// DNS failures are always `DnsWrite` / `DnsRead`, both retryable.
//
// ## Security Requirements
//
// - API tokens NEVER appear in logs or `Debug` output
// - Tokens are sent as `Authorization: Bearer <token>` only when configured

pub mod dns;
pub mod registrar;
pub mod trigger;

pub use dns::HttpDnsClient;
pub use registrar::{HttpRegistrar, Subaccount};
pub use trigger::HttpConfigTrigger;

use std::sync::Arc;
use std::time::Duration;

use provision_core::config::{EndpointConfig, ProvisionConfig};
use provision_core::{Error, Result};
use reqwest::{StatusCode, Url};

/// The three service clients, built once at startup
#[derive(Debug, Clone)]
pub struct HttpClients {
    pub registrar: Arc<HttpRegistrar>,
    pub dns: Arc<HttpDnsClient>,
    pub trigger: Arc<HttpConfigTrigger>,
}

impl HttpClients {
    /// Build every client from configuration
    ///
    /// Fails if any endpoint URL is missing.
    pub fn from_config(config: &ProvisionConfig) -> Result<Self> {
        Ok(Self {
            registrar: Arc::new(HttpRegistrar::from_config(&config.registrar)?),
            dns: Arc::new(HttpDnsClient::from_config(&config.dns)?),
            trigger: Arc::new(HttpConfigTrigger::from_config(&config.trigger)?),
        })
    }
}

/// Build a reqwest client with a request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Check that an endpoint is usable and return its URL without a trailing slash
pub(crate) fn endpoint_url(service: &str, endpoint: &EndpointConfig) -> Result<String> {
    if !endpoint.is_configured() {
        return Err(Error::config(format!("{} URL is required", service)));
    }
    endpoint.validate(service)?;
    Ok(endpoint.base_url.trim().trim_end_matches('/').to_string())
}

/// Parse a service base URL that further path segments can be appended to
pub(crate) fn parse_base_url(service: &str, base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url.trim())
        .map_err(|e| Error::config(format!("Invalid {} URL '{}': {}", service, base_url, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::config(format!(
            "{} URL cannot carry a path: {}",
            service, base_url
        )));
    }
    Ok(url)
}

/// Append path segments to a base URL, percent-encoding each one
///
/// A caller-supplied value such as a shopper id or domain always stays a
/// single segment: `/`, `?` and `#` are escaped rather than interpreted.
pub(crate) fn service_url(service: &str, base_url: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| Error::config(format!("{} URL cannot carry a path: {}", service, base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Whether a failed status is worth retrying
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Map a non-success status to a retryable or terminal error
pub(crate) fn status_error(service: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("{} {}", status, body.trim());
    if is_transient_status(status) {
        Error::retryable(service, message)
    } else {
        Error::terminal(service, message)
    }
}

/// Map a transport failure (connect, timeout, body) to a retryable error
pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> Error {
    Error::retryable(service, format!("HTTP request failed: {}", err.without_url()))
}

/// Read a response body for an error message
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}
