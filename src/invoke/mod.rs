//! Invocation with log correlation.
//!
//! [`Correlator::call`] issues one outbound request while a [`LogListener`]
//! concurrently receives the invocation's log lines on a fresh inbox, then
//! combines both into one result. Priority, highest first:
//!
//! 1. a remote application error reported through the listener;
//! 2. the HTTP response (error header, status code, body), used directly when
//!    there is no listener or when the listener's stream broke.
//!
//! A gateway timeout is ambiguous: the function may still finish and report
//! through the listener, so the status check is deferred to it. Without a
//! listener the timeout is final.

mod caller;
mod listener;
mod memory;

pub use caller::*;
pub use listener::*;
pub use memory::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cloud::CloudError;

/// Request header naming the inbox log lines should be published to.
pub const LOG_INBOX_HEADER: &str = "x-stackmate-log-inbox";
/// Request header naming the log [`StreamType`].
pub const LOG_STREAM_TYPE_HEADER: &str = "x-stackmate-log-stream-type";
/// Response header carrying a backend error message.
pub const ERROR_HEADER: &str = "x-stackmate-error";

#[derive(Debug, Error)]
pub enum InvokeError {
    /// The invoked function reported a failure.
    #[error("{0}")]
    Remote(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("{method} timed out")]
    Timeout { method: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl InvokeError {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// A call whose outcome is resolved later by the caller.
pub struct PendingInvocation {
    pub response: RawResponse,
    /// Resolves when the listener sees completion; `None` without a listener.
    pub completion: Option<JoinHandle<ListenerOutcome>>,
}

/// Wraps one [`Caller`] with an optional log listener.
#[derive(Clone)]
pub struct Correlator {
    caller: Arc<dyn Caller>,
    transport: Option<Arc<dyn LogTransport>>,
    sink: LogSink,
}

impl Correlator {
    pub fn new(caller: Arc<dyn Caller>) -> Self {
        Self {
            caller,
            transport: None,
            sink: LogSink::default(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Call `method` with `req` and decode the response.
    ///
    /// Returns `Ok(None)` for an empty (204) response, and for a gateway
    /// timeout the listener later confirmed as successful.
    pub async fn call<Req, Rsp>(&self, method: &str, req: &Req) -> Result<Option<Rsp>, InvokeError>
    where
        Req: Serialize + ?Sized,
        Rsp: DeserializeOwned,
    {
        let (response, listener) = self.send(method, req).await?;
        let outcome = match listener {
            Some(listener) => Some(listener.wait().await),
            None => None,
        };
        resolve(method, response, outcome)
    }

    /// Send the request and hand back the raw response right away. The
    /// listener, if any, keeps running and resolves `completion` on its own.
    pub async fn call_detached<Req>(&self, method: &str, req: &Req) -> Result<PendingInvocation, InvokeError>
    where
        Req: Serialize + ?Sized,
    {
        let (response, listener) = self.send(method, req).await?;
        let completion = listener.map(|l| tokio::spawn(l.wait()));
        Ok(PendingInvocation {
            response,
            completion,
        })
    }

    async fn send<Req>(&self, method: &str, req: &Req) -> Result<(RawResponse, Option<LogListener>), InvokeError>
    where
        Req: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(req).map_err(InvokeError::Encode)?;
        let listener = self.start_listener().await;

        let mut headers = BTreeMap::new();
        if let Some(listener) = &listener {
            headers.insert(LOG_INBOX_HEADER.to_string(), listener.inbox().to_string());
            headers.insert(
                LOG_STREAM_TYPE_HEADER.to_string(),
                listener.stream_type().as_str().to_string(),
            );
        }

        match self.caller.send(method, body, &headers).await {
            Ok(response) => Ok((response, listener)),
            Err(e) => {
                if let Some(listener) = listener {
                    listener.abort();
                }
                Err(e)
            }
        }
    }

    /// Set up a listener, or carry on without log streaming if that fails.
    async fn start_listener(&self) -> Option<LogListener> {
        let transport = self.transport.as_ref()?;
        match LogListener::start(transport.as_ref(), self.sink.clone()).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::warn!(error = %e, "Log streaming unavailable, continuing without logs");
                None
            }
        }
    }
}

/// Combine the raw response and the listener outcome into the final result.
pub fn resolve<Rsp: DeserializeOwned>(
    method: &str,
    response: RawResponse,
    outcome: Option<ListenerOutcome>,
) -> Result<Option<Rsp>, InvokeError> {
    let timed_out = response.status == StatusCode::GATEWAY_TIMEOUT;

    match outcome {
        Some(ListenerOutcome::RemoteError(message)) => return Err(InvokeError::Remote(message)),
        Some(ListenerOutcome::Completed) if timed_out => return Ok(None),
        Some(ListenerOutcome::Completed) => {}
        Some(ListenerOutcome::TransportError(reason)) => {
            tracing::warn!(%method, %reason, "Log stream failed, using the HTTP response");
        }
        None => {}
    }

    if timed_out {
        return Err(InvokeError::Timeout {
            method: method.to_string(),
        });
    }
    if let Some(error) = response.error {
        return Err(InvokeError::Backend(error));
    }
    if !response.status.is_success() {
        return Err(InvokeError::Status {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }
    if response.status == StatusCode::NO_CONTENT || response.body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&response.body)
        .map(Some)
        .map_err(InvokeError::Decode)
}
