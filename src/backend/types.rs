//! Request and response bodies for the node backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Function, ModelError, Stage};

// ============================================================
// Request Types
// ============================================================

/// One function as the backend needs to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    /// Cloud resource name, unique per node.
    pub resource_name: String,
    pub s3_key: String,
    pub memory_size: u32,
    pub timeout: u32,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub keep_warm: bool,
}

impl FunctionSpec {
    pub fn from_function(stage: &Stage, function: &Function) -> Result<Self, ModelError> {
        let config = &function.configuration;
        Ok(Self {
            name: function.name.clone(),
            resource_name: stage.resource_name(&function.name)?,
            s3_key: function.s3_key().to_string(),
            memory_size: config.memory_size,
            timeout: config.timeout,
            env: config.env.clone(),
            cron: config.cron.clone(),
            private: config.private,
            keep_warm: config.keep_warm,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub name: String,
    pub hash: String,
}

/// Full topology for a stage: every function and site it should have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub project: String,
    pub stage: String,
    pub node_id: String,
    /// Bucket holding the function artifacts.
    pub bucket: String,
    pub functions: Vec<FunctionSpec>,
    pub public: Vec<SiteSpec>,
    pub tags: BTreeMap<String, String>,
}

/// Code-only update for functions whose artifact changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub project: String,
    pub stage: String,
    pub bucket: String,
    pub functions: Vec<FunctionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyRequest {
    pub project: String,
    pub stage: String,
    pub node_id: String,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResponse {
    #[serde(default)]
    pub rest_endpoint: Option<String>,
    #[serde(default)]
    pub ws_endpoint: Option<String>,
    /// Bucket created for the stage's public sites.
    #[serde(default)]
    pub public_bucket: Option<String>,
    #[serde(default)]
    pub sites: Vec<SiteStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub name: String,
    pub bucket: String,
}
