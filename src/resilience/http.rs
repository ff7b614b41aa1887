//! # HTTP Convenience Wrappers
//!
//! `get`/`post`/`put` helpers that route a marketplace HTTP request through
//! [`ResilienceGateway::execute_api_call`], classifying responses at the
//! call boundary: 401/403 are auth failures (never retried), 5xx and
//! transport errors are transient, any other non-success status surfaces
//! as-is.

use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::resilience::{ApiCallError, ResilienceError, ResilienceGateway};

/// HTTP client bound to the gateway's protection chain.
#[derive(Clone)]
pub struct HttpApiClient {
    gateway: Arc<ResilienceGateway>,
    client: Client,
}

impl HttpApiClient {
    pub fn new(gateway: Arc<ResilienceGateway>, client: Client) -> Self {
        Self { gateway, client }
    }

    /// Execute a GET request under the full protection chain.
    pub async fn get(&self, tenant_id: Uuid, url: &str) -> Result<Response, ResilienceError> {
        self.request(tenant_id, Method::GET, url, None).await
    }

    /// Execute a POST request with a JSON body.
    pub async fn post(
        &self,
        tenant_id: Uuid,
        url: &str,
        body: &Value,
    ) -> Result<Response, ResilienceError> {
        self.request(tenant_id, Method::POST, url, Some(body)).await
    }

    /// Execute a PUT request with a JSON body.
    pub async fn put(
        &self,
        tenant_id: Uuid,
        url: &str,
        body: &Value,
    ) -> Result<Response, ResilienceError> {
        self.request(tenant_id, Method::PUT, url, Some(body)).await
    }

    async fn request(
        &self,
        tenant_id: Uuid,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, ResilienceError> {
        debug!(tenant_id = %tenant_id, %method, url, "Dispatching marketplace HTTP request");

        self.gateway
            .execute_api_call(tenant_id, || {
                // Each attempt builds a fresh request so retries never reuse
                // a consumed body.
                let mut builder = self.client.request(method.clone(), url);
                if let Some(body) = body {
                    builder = builder.json(body);
                }
                async move {
                    let response = builder
                        .send()
                        .await
                        .map_err(|err| ApiCallError::connection(err.to_string()))?;
                    classify_status(response)
                }
            })
            .await
    }
}

/// Map a response's status to the call-boundary classification.
fn classify_status(response: Response) -> Result<Response, ApiCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiCallError::auth(
            status.as_u16(),
            format!("marketplace rejected credentials: {status}"),
        )),
        s if s.is_server_error() => Err(ApiCallError::server(
            status.as_u16(),
            format!("marketplace server error: {status}"),
        )),
        _ => Err(ApiCallError::other(format!(
            "unexpected marketplace response: {status}"
        ))),
    }
}
