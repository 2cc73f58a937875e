//! HTTP registrar client
//!
//! ```http
//! POST {base}/v1/domains/purchase
//! Authorization: Bearer <token>
//! {"domain": "example.com"}
//! ```
//!
//! 2xx is a purchase; a 4xx body `{"code", "message"}` is a rejection
//! (unavailable, invalid syntax, billing) and is returned as an
//! unsuccessful [`PurchaseResult`] rather than an error.

use async_trait::async_trait;
use provision_core::config::EndpointConfig;
use provision_core::traits::{PurchaseResult, Registrar};
use provision_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    build_client, endpoint_url, error_body, is_transient_status, parse_base_url, service_url,
    status_error, transport_error,
};

const SERVICE: &str = "registrar";

/// A registrar shopper/subaccount record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subaccount {
    pub shopper_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name_first: Option<String>,
    #[serde(default)]
    pub name_last: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistrarErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Registrar service client
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct HttpRegistrar {
    base_url: reqwest::Url,
    /// ⚠️ NEVER log this value
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistrar")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpRegistrar {
    /// Create a registrar client
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

    /// Create a registrar client from an endpoint configuration
    pub fn from_config(endpoint: &EndpointConfig) -> Result<Self> {
        Self::new(
            endpoint_url(SERVICE, endpoint)?,
            endpoint.api_token.clone(),
            Duration::from_secs(endpoint.timeout_secs),
        )
    }

    /// Look up a shopper/subaccount by id
    ///
    /// # API Call
    ///
    /// ```http
    /// GET {base}/v1/shoppers/{shopper_id}
    /// ```
    pub async fn subaccount(&self, shopper_id: &str) -> Result<Subaccount> {
        let url = service_url(SERVICE, &self.base_url, &["v1", "shoppers", shopper_id])?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("Shopper not found: {}", shopper_id)));
        }
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(status_error(SERVICE, status, &body));
        }

        response.json::<Subaccount>().await.map_err(|e| {
            Error::retryable(SERVICE, format!("Failed to parse shopper response: {}", e))
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn purchase(&self, domain: &str) -> Result<PurchaseResult> {
        let url = service_url(SERVICE, &self.base_url, &["v1", "domains", "purchase"])?;
        tracing::debug!("Requesting purchase of {}", domain);

        let response = self
            .authorized(self.client.post(url))
            .json(&serde_json::json!({ "domain": domain }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("Registrar accepted purchase of {}", domain);
            return Ok(PurchaseResult::purchased());
        }

        let body = error_body(response).await;
        if is_transient_status(status) {
            return Err(status_error(SERVICE, status, &body));
        }

        let reason = match serde_json::from_str::<RegistrarErrorBody>(&body) {
            Ok(RegistrarErrorBody {
                code: Some(code),
                message: Some(message),
            }) => format!("{}: {}", code, message),
            Ok(RegistrarErrorBody {
                message: Some(message),
                ..
            }) => message,
            Ok(RegistrarErrorBody {
                code: Some(code), ..
            }) => format!("{} ({})", code, status),
            _ => format!("{} {}", status, body.trim()),
        };
        tracing::warn!("Registrar rejected purchase of {}: {}", domain, reason);
        Ok(PurchaseResult::rejected(reason))
    }

    fn registrar_name(&self) -> &'static str {
        "http-registrar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registrar(server: &MockServer) -> HttpRegistrar {
        HttpRegistrar::new(
            server.uri(),
            Some("registrar-secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_purchase_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/domains/purchase"))
            .and(header("authorization", "Bearer registrar-secret"))
            .and(body_json(serde_json::json!({ "domain": "example.com" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = registrar(&server).purchase("example.com").await.unwrap();
        assert!(result.success);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_purchase_rejection_is_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/domains/purchase"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "code": "UNAVAILABLE_DOMAIN",
                "message": "The domain is not available"
            })))
            .mount(&server)
            .await;

        let result = registrar(&server).purchase("taken.com").await.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("UNAVAILABLE_DOMAIN: The domain is not available")
        );
    }

    #[tokio::test]
    async fn test_purchase_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/domains/purchase"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = registrar(&server).purchase("example.com").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_purchase_rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = registrar(&server).purchase("example.com").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_purchase_network_error_is_retryable() {
        // Nothing listens on the discard port
        let registrar =
            HttpRegistrar::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let err = registrar.purchase("example.com").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_subaccount_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/shoppers/12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "shopperId": "12345",
                "customerId": "c-1",
                "email": "owner@example.com"
            })))
            .mount(&server)
            .await;

        let subaccount = registrar(&server).subaccount("12345").await.unwrap();
        assert_eq!(subaccount.shopper_id, "12345");
        assert_eq!(subaccount.customer_id.as_deref(), Some("c-1"));
        assert_eq!(subaccount.name_first, None);
    }

    #[tokio::test]
    async fn test_subaccount_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/shoppers/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = registrar(&server).subaccount("missing").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_shopper_id_is_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/shoppers/a%2Fb%3Fc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "shopperId": "a/b?c"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let subaccount = registrar(&server).subaccount("a/b?c").await.unwrap();
        assert_eq!(subaccount.shopper_id, "a/b?c");
    }

    #[tokio::test]
    async fn test_base_url_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registrar/v1/domains/purchase"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registrar =
            HttpRegistrar::new(format!("{}/registrar/", server.uri()), None, Duration::from_secs(5))
                .unwrap();
        assert!(registrar.purchase("example.com").await.unwrap().success);
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let registrar = HttpRegistrar::new(
            "https://registrar.example",
            Some("secret_token_12345".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let debug_str = format!("{:?}", registrar);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("HttpRegistrar"));
    }
}
