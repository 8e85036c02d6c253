//! JSON-RPC transport for the OPSI API.

use std::time::Duration;

use async_trait::async_trait;
use netinv_core::config::OpsiConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors from OPSI API calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("OPSI configuration error: {0}")]
    Config(String),

    #[error("OPSI API connection failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OPSI API HTTP error {status}")]
    Status { status: u16 },

    #[error("Invalid JSON response from OPSI API: {0}")]
    Decode(String),

    #[error("OPSI API error: {0}")]
    Api(Value),
}

/// A JSON-RPC endpoint that accepts positional parameters.
#[async_trait]
pub trait OpsiApi: Send + Sync {
    /// Invoke `method` and return its `result` value.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    id: i64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// HTTP client for the OPSI JSON-RPC endpoint, authenticating with basic auth.
#[derive(Clone)]
pub struct OpsiClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl OpsiClient {
    /// Build a client from configuration.
    ///
    /// Fails when the URL or credentials are missing, or when a configured CA
    /// bundle cannot be loaded.
    pub fn from_config(config: &OpsiConfig) -> Result<Self, RpcError> {
        let (url, username, password) = match (
            non_empty(&config.api_url),
            non_empty(&config.username),
            non_empty(&config.password),
        ) {
            (Some(u), Some(n), Some(p)) => (u, n, p),
            _ => {
                return Err(RpcError::Config(
                    "OPSI configuration requires api_url, username, and password".to_string(),
                ))
            }
        };

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout.max(1)));

        if let Some(bundle) = &config.ca_bundle {
            let pem = std::fs::read(bundle).map_err(|e| {
                RpcError::Config(format!(
                    "specified CA bundle {} could not be read: {e}",
                    bundle.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                RpcError::Config(format!("invalid CA bundle {}: {e}", bundle.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        } else if !config.verify_ssl {
            tracing::warn!(url = %url, "TLS certificate verification disabled for OPSI API");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| RpcError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OpsiApi for OpsiClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let request = RpcRequest {
            id: chrono::Utc::now().timestamp_millis(),
            method,
            params: &params,
        };

        let shown = Value::from(params.clone());
        tracing::debug!(method, params = %shown, "Calling OPSI method");

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let decoded: RpcResponse =
            serde_json::from_str(&body).map_err(|e| RpcError::Decode(e.to_string()))?;

        if !decoded.error.is_null() {
            return Err(RpcError::Api(decoded.error));
        }

        Ok(decoded.result)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
