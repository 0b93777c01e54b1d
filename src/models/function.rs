use serde::{Deserialize, Serialize};

use super::FunctionConfiguration;

/// One deployable unit of compute.
///
/// `hash` is the content hash of the last uploaded artifact and `s3_key` the
/// object key it was uploaded to. The two only change together through
/// [`Function::set_artifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    s3_key: String,
    #[serde(default)]
    pub configuration: FunctionConfiguration,
}

impl Function {
    /// A freshly discovered function with default configuration and no artifact.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: String::new(),
            s3_key: String::new(),
            configuration: FunctionConfiguration::defaults(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn s3_key(&self) -> &str {
        &self.s3_key
    }

    /// Record a newly uploaded artifact.
    pub fn set_artifact(&mut self, hash: impl Into<String>, s3_key: impl Into<String>) {
        self.hash = hash.into();
        self.s3_key = s3_key.into();
    }
}
