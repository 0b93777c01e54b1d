//! Outbound transports for a single request: HTTP or direct function invoke.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{InvokeError, ERROR_HEADER};
use crate::cloud::CloudClient;

/// The response of an outbound call before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    /// Value of the dedicated error header, if present.
    pub error: Option<String>,
    pub body: Vec<u8>,
}

/// Sends one request and returns the raw response.
#[async_trait]
pub trait Caller: Send + Sync {
    async fn send(
        &self,
        method: &str,
        body: Vec<u8>,
        headers: &BTreeMap<String, String>,
    ) -> Result<RawResponse, InvokeError>;
}

// ============================================================
// HTTP
// ============================================================

/// `POST <base_url>/<method>` with a JSON body and optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpCaller {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpCaller {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(base_url, token, Client::new())
    }

    /// Share an existing client (connection pool, timeout settings).
    pub fn with_client(base_url: impl Into<String>, token: Option<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        }
    }

    /// A client with an overall request timeout.
    pub fn client_with_timeout(timeout: Duration) -> Result<Client, InvokeError> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    pub fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method.trim_start_matches('/'))
    }
}

#[async_trait]
impl Caller for HttpCaller {
    async fn send(
        &self,
        method: &str,
        body: Vec<u8>,
        headers: &BTreeMap<String, String>,
    ) -> Result<RawResponse, InvokeError> {
        let mut req = self
            .client
            .post(self.url(method))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req.send().await?;
        let status = response.status();
        let error = response
            .headers()
            .get(ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            error,
            body,
        })
    }
}

// ============================================================
// Direct invoke
// ============================================================

/// Invokes a cloud function directly; `method` is the function's resource name.
#[derive(Clone)]
pub struct FunctionCaller {
    cloud: Arc<dyn CloudClient>,
}

impl FunctionCaller {
    pub fn new(cloud: Arc<dyn CloudClient>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl Caller for FunctionCaller {
    async fn send(
        &self,
        method: &str,
        body: Vec<u8>,
        headers: &BTreeMap<String, String>,
    ) -> Result<RawResponse, InvokeError> {
        let output = self
            .cloud
            .invoke_function(method, body, headers.clone())
            .await?;
        let status = StatusCode::from_u16(output.status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Ok(RawResponse {
            status,
            error: output.function_error,
            body: output.payload,
        })
    }
}
