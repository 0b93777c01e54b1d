use serde::{Deserialize, Serialize};

/// A named bundle of static content served from a public bucket.
///
/// Same lifecycle as a function, keyed by a directory hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSite {
    pub name: String,
    #[serde(default)]
    pub hash: String,
    /// Bucket reported by the backend on the last apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl PublicSite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
