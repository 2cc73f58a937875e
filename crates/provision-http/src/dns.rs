// # HTTP DNS Client
//
// Replaces and reads back a domain's record set through the DNS provider API:
//
// ```http
// PUT {base}/v1/domains/{domain}/records    body: [DnsRecord, ...]
// GET {base}/v1/domains/{domain}/records    -> [DnsRecord, ...]
// ```
//
// The PUT replaces every record of the domain, so repeating it is harmless.
// Any failure is reported as `DnsWrite` / `DnsRead` and retried by the worker.

use async_trait::async_trait;
use provision_core::config::EndpointConfig;
use provision_core::planner::DnsRecord;
use provision_core::traits::DnsClient;
use provision_core::{Error, Result};
use std::time::Duration;

use crate::{build_client, endpoint_url, error_body, parse_base_url, service_url};

const SERVICE: &str = "dns";

/// DNS provider client
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct HttpDnsClient {
    base_url: reqwest::Url,
    /// ⚠️ NEVER log this value
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpDnsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDnsClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpDnsClient {
    /// Create a DNS client
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(SERVICE, &base_url.into())?,
            api_token,
            client: build_client(timeout)?,
        })
    }

    /// Create a DNS client from an endpoint configuration
    pub fn from_config(endpoint: &EndpointConfig) -> Result<Self> {
        Self::new(
            endpoint_url(SERVICE, endpoint)?,
            endpoint.api_token.clone(),
            Duration::from_secs(endpoint.timeout_secs),
        )
    }

    fn records_url(&self, domain: &str) -> Result<reqwest::Url> {
        service_url(SERVICE, &self.base_url, &["v1", "domains", domain, "records"])
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl DnsClient for HttpDnsClient {
    async fn write(&self, domain: &str, records: &[DnsRecord]) -> Result<()> {
        tracing::debug!("Writing {} record(s) for {}", records.len(), domain);

        let url = self.records_url(domain)?;
        let response = self
            .authorized(self.client.put(url))
            .json(records)
            .send()
            .await
            .map_err(|e| {
                Error::dns_write(format!("HTTP request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::dns_write(format!(
                "{} for {}: {}",
                status,
                domain,
                body.trim()
            )));
        }

        tracing::info!("Wrote {} record(s) for {}", records.len(), domain);
        Ok(())
    }

    async fn read(&self, domain: &str) -> Result<Vec<DnsRecord>> {
        let url = self.records_url(domain)?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::dns_read(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::dns_read(format!(
                "{} for {}: {}",
                status,
                domain,
                body.trim()
            )));
        }

        response
            .json::<Vec<DnsRecord>>()
            .await
            .map_err(|e| Error::dns_read(format!("Failed to parse records for {}: {}", domain, e)))
    }

    fn provider_name(&self) -> &'static str {
        "http-dns"
    }
}
