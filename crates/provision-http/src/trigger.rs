//! HTTP configuration trigger
//!
//! ```http
//! POST {url}
//! {"domain": "example.com", "projectId": "project-1"}
//! ```
//!
//! The URL is used as-is; no path is appended.

use async_trait::async_trait;
use provision_core::Result;
use provision_core::config::EndpointConfig;
use provision_core::traits::ConfigTrigger;
use serde::Serialize;
use std::time::Duration;

use crate::{build_client, endpoint_url, error_body, status_error, transport_error};

const SERVICE: &str = "config-trigger";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest<'a> {
    domain: &'a str,
    project_id: &'a str,
}

/// Downstream reconfiguration hook
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct HttpConfigTrigger {
    url: String,
    /// ⚠️ NEVER log this value
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpConfigTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfigTrigger")
            .field("url", &self.url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpConfigTrigger {
    pub fn new(url: impl Into<String>, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            api_token,
            client: build_client(timeout)?,
        })
    }

    pub fn from_config(endpoint: &EndpointConfig) -> Result<Self> {
        Self::new(
            endpoint_url(SERVICE, endpoint)?,
            endpoint.api_token.clone(),
            Duration::from_secs(endpoint.timeout_secs),
        )
    }
}

#[async_trait]
impl ConfigTrigger for HttpConfigTrigger {
    async fn trigger(&self, domain: &str, project_id: &str) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&TriggerRequest { domain, project_id });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(status_error(SERVICE, status, &body));
        }

        tracing::info!("Triggered reconfiguration of {} for {}", project_id, domain);
        Ok(())
    }
}
