//! Client for a node's backend: stage provisioning, code updates, teardown.
//!
//! Every call gets a freshly signed token and goes through a [`Correlator`],
//! so the backend's own progress logs stream back while it works.

mod types;

pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use crate::config::RuntimeConfig;
use crate::invoke::{Correlator, HttpCaller, InvokeError, LogSink, LogTransport};
use crate::models::{ModelError, Node, Stage};

pub const PROVISION_METHOD: &str = "deploy/provision";
pub const UPDATE_METHOD: &str = "deploy/update";
pub const DESTROY_METHOD: &str = "destroy";

/// The backend operations the deploy orchestrator needs.
#[async_trait]
pub trait StageBackend: Send + Sync {
    async fn provision(&self, req: &ProvisionRequest) -> Result<ApplyResponse, InvokeError>;

    async fn update(&self, req: &UpdateRequest) -> Result<ApplyResponse, InvokeError>;

    async fn destroy(&self, req: &DestroyRequest) -> Result<(), InvokeError>;
}

/// Errors building a [`BackendClient`] from a stage.
#[derive(Debug, thiserror::Error)]
pub enum BackendSetupError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// HTTP client for one project/stage on one node.
#[derive(Clone)]
pub struct BackendClient {
    node: Arc<Node>,
    project: String,
    stage: String,
    token_ttl: chrono::Duration,
    client: Client,
    transport: Option<Arc<dyn LogTransport>>,
    sink: LogSink,
}

impl BackendClient {
    pub fn new(
        config: &RuntimeConfig,
        node: Arc<Node>,
        project: impl Into<String>,
        stage: impl Into<String>,
    ) -> Result<Self, InvokeError> {
        let token_ttl = chrono::Duration::from_std(config.token_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        Ok(Self {
            node,
            project: project.into(),
            stage: stage.into(),
            token_ttl,
            client: HttpCaller::client_with_timeout(config.request_timeout)?,
            transport: None,
            sink: LogSink::default(),
        })
    }

    /// Build a client from a wired stage.
    pub fn for_stage(config: &RuntimeConfig, stage: &Stage) -> Result<Self, BackendSetupError> {
        let node = stage
            .context()
            .node
            .clone()
            .ok_or_else(|| ModelError::Unwired(stage.name.clone()))?;
        let project = stage.project_name()?.to_string();
        Ok(Self::new(config, node, project, stage.name.clone())?)
    }

    pub fn with_transport(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    fn correlator(&self) -> Correlator {
        let token = self
            .node
            .issue_token(&self.project, &self.stage, self.token_ttl, Utc::now());
        let caller = HttpCaller::with_client(&self.node.endpoint, Some(token), self.client.clone());
        let correlator = Correlator::new(Arc::new(caller)).with_log_sink(self.sink.clone());
        match &self.transport {
            Some(transport) => correlator.with_transport(transport.clone()),
            None => correlator,
        }
    }
}

#[async_trait]
impl StageBackend for BackendClient {
    async fn provision(&self, req: &ProvisionRequest) -> Result<ApplyResponse, InvokeError> {
        let rsp = self.correlator().call(PROVISION_METHOD, req).await?;
        if rsp.is_none() {
            tracing::warn!(
                project = %self.project,
                stage = %self.stage,
                "Backend returned no body after provisioning, stage endpoints were not refreshed"
            );
        }
        Ok(rsp.unwrap_or_default())
    }

    async fn update(&self, req: &UpdateRequest) -> Result<ApplyResponse, InvokeError> {
        let rsp = self.correlator().call(UPDATE_METHOD, req).await?;
        Ok(rsp.unwrap_or_default())
    }

    async fn destroy(&self, req: &DestroyRequest) -> Result<(), InvokeError> {
        self.correlator()
            .call::<_, serde_json::Value>(DESTROY_METHOD, req)
            .await?;
        Ok(())
    }
}
