//! Cloud Load Balancer REST Client
//!
//! Native REST implementation of the provider's NodeBalancer API v4.
//! Uses reqwest for HTTP requests and a bearer token for authentication.
//!
//! This implementation:
//! - Issues exactly one HTTP request per operation (no internal retries)
//! - Bounds every request with a client-side timeout
//! - Maps 404 responses onto [`AdapterError::NotFound`]

use super::{
    AdapterError, CloudClientFactory, LoadBalancer, LoadBalancerApi, LoadBalancerConfig,
    LoadBalancerConfigSpec, LoadBalancerSpec,
};
use crate::observability::metrics;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};
use zeroize::Zeroizing;

// ============================================================================
// Response Structures
// ============================================================================

/// Paginated list envelope returned by collection endpoints
#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

/// Provider error response wrapper
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: String,
    #[serde(default)]
    field: Option<String>,
}

/// Cloud load balancer REST client
pub struct RestLoadBalancerClient {
    http_client: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for RestLoadBalancerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestLoadBalancerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestLoadBalancerClient {
    /// Create a client for `base_url` authenticated with `token`
    ///
    /// # Errors
    /// Returns an error if the token is empty or the HTTP client cannot be built
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, AdapterError> {
        if token.is_empty() {
            return Err(AdapterError::Transport("API token is empty".to_string()));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Zeroizing::new(token.to_string()),
        })
    }

    /// Build HTTP request with authentication headers
    fn make_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v4/{}", self.base_url, path);
        self.http_client
            .request(method, url)
            .bearer_auth(self.token.as_str())
            .header("Content-Type", "application/json")
    }

    /// Send a request and decode a JSON response body
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AdapterError> {
        let start = Instant::now();
        let result = self.send_inner(request).await;
        metrics::observe_cloud_operation(operation, &result, start.elapsed());
        let body = result?;
        serde_json::from_str(&body).map_err(|e| AdapterError::Decode(e.to_string()))
    }

    async fn send_inner(&self, request: reqwest::RequestBuilder) -> Result<String, AdapterError> {
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(text);
        }
        Err(Self::handle_error_response(status, &text))
    }

    /// Translate a non-success response into an adapter error
    fn handle_error_response(status: StatusCode, error_text: &str) -> AdapterError {
        let message = match serde_json::from_str::<ErrorResponse>(error_text) {
            Ok(response) => response
                .errors
                .iter()
                .map(|e| match &e.field {
                    Some(field) => format!("{field}: {}", e.reason),
                    None => e.reason.clone(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            Err(_) => error_text.to_string(),
        };

        if status == StatusCode::NOT_FOUND {
            AdapterError::NotFound(message)
        } else {
            AdapterError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl LoadBalancerApi for RestLoadBalancerClient {
    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec,
    ) -> Result<LoadBalancer, AdapterError> {
        let span = info_span!("cloud.create_load_balancer", label = %spec.label, region = %spec.region);
        async {
            debug!("creating load balancer");
            let request = self.make_request(Method::POST, "nodebalancers").json(spec);
            self.send("create_load_balancer", request).await
        }
        .instrument(span)
        .await
    }

    async fn get_load_balancer(&self, id: i64) -> Result<LoadBalancer, AdapterError> {
        let span = info_span!("cloud.get_load_balancer", load_balancer.id = id);
        async {
            let request = self.make_request(Method::GET, &format!("nodebalancers/{id}"));
            self.send("get_load_balancer", request).await
        }
        .instrument(span)
        .await
    }

    async fn find_load_balancer(&self, label: &str) -> Result<Option<LoadBalancer>, AdapterError> {
        let span = info_span!("cloud.find_load_balancer", label = %label);
        async {
            let filter = serde_json::json!({ "label": label }).to_string();
            let request = self
                .make_request(Method::GET, "nodebalancers")
                .header("X-Filter", filter);
            let page: Page<LoadBalancer> = self.send("find_load_balancer", request).await?;
            Ok(page.data.into_iter().find(|lb| lb.label == label))
        }
        .instrument(span)
        .await
    }

    async fn create_load_balancer_config(
        &self,
        load_balancer_id: i64,
        spec: &LoadBalancerConfigSpec,
    ) -> Result<LoadBalancerConfig, AdapterError> {
        let span = info_span!(
            "cloud.create_load_balancer_config",
            load_balancer.id = load_balancer_id,
            port = spec.port
        );
        async {
            let request = self
                .make_request(
                    Method::POST,
                    &format!("nodebalancers/{load_balancer_id}/configs"),
                )
                .json(spec);
            self.send("create_load_balancer_config", request).await
        }
        .instrument(span)
        .await
    }

    async fn delete_load_balancer(&self, id: i64) -> Result<(), AdapterError> {
        let span = info_span!("cloud.delete_load_balancer", load_balancer.id = id);
        async {
            let request = self.make_request(Method::DELETE, &format!("nodebalancers/{id}"));
            let _: serde_json::Value = self.send("delete_load_balancer", request).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Factory producing [`RestLoadBalancerClient`]s for a fixed API endpoint
#[derive(Debug, Clone)]
pub struct RestClientFactory {
    base_url: String,
    timeout: Duration,
}

impl RestClientFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl CloudClientFactory for RestClientFactory {
    fn client(&self, token: &str) -> Result<Arc<dyn LoadBalancerApi>, AdapterError> {
        let client = RestLoadBalancerClient::new(&self.base_url, token, self.timeout)?;
        Ok(Arc::new(client))
    }
}
