//! Versioned, human-readable state documents.
//!
//! Every document starts with a header comment marking it machine-maintained,
//! followed by YAML with a `version` field checked on load.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::StoreError;

pub const HEADER: &str = "# Automatically maintained by stackmate. Do not edit.\n";

/// Current document format version.
pub const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    #[serde(flatten)]
    body: T,
}

/// Render `body` with the header and version envelope.
pub fn render<T: Serialize>(body: &T) -> Result<String, StoreError> {
    let yaml = serde_yaml::to_string(&Envelope {
        version: VERSION,
        body,
    })?;
    Ok(format!("{}{}", HEADER, yaml))
}

/// Parse a document, rejecting unknown versions.
pub fn parse<T: DeserializeOwned>(content: &str) -> Result<T, StoreError> {
    let envelope: Envelope<serde_yaml::Value> = serde_yaml::from_str(content)?;
    if envelope.version != VERSION {
        return Err(StoreError::VersionMismatch {
            found: envelope.version,
            expected: VERSION,
        });
    }
    Ok(serde_yaml::from_value(envelope.body)?)
}
