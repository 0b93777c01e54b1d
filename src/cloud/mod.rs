//! The cloud provider as seen by the deploy core.
//!
//! Only two capabilities are needed: storing objects and invoking a function
//! directly. Everything else (stacks, permissions, gateways) is provisioned
//! by the node's backend.

mod local;

pub use local::DirectoryCloud;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Failed to store {bucket}/{key}: {message}")]
    PutObject {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to invoke {function}: {message}")]
    Invoke { function: String, message: String },

    #[error("{0} is not supported by this cloud client")]
    Unsupported(&'static str),
}

/// Result of a direct function invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeOutput {
    pub status_code: u16,
    pub payload: Vec<u8>,
    /// Set when the function itself reported a failure.
    pub function_error: Option<String>,
}

#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), CloudError>;

    /// Invoke `function` synchronously. `context` is passed to the function
    /// as client context (log inbox, stream type).
    async fn invoke_function(
        &self,
        function: &str,
        payload: Vec<u8>,
        context: BTreeMap<String, String>,
    ) -> Result<InvokeOutput, CloudError>;
}
