use serde::{Deserialize, Serialize};

/// One configured cloud account/region pair.
///
/// Nodes are created by `stackmate node add` and owned by the [`Workspace`].
/// The `id` is a short random suffix appended to every cloud resource the
/// node creates so two nodes in the same account never collide.
///
/// [`Workspace`]: super::Workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub id: String,
    pub account_id: String,
    pub region: String,
    /// Bucket holding function artifacts for every stage on this node.
    pub bucket: String,
    /// Base URL of the node's backend (apply / destroy calls).
    pub endpoint: String,
    pub keys: NodeKeys,
    #[serde(default)]
    pub default: bool,
}

/// Key material generated when the node is added.
///
/// `secret` signs backend tokens; `key_id` travels in the token so the backend
/// knows which key to verify with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeKeys {
    pub key_id: String,
    pub secret: String,
}

impl std::fmt::Debug for NodeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeys")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl NodeKeys {
    pub fn generate() -> Self {
        let secret: [u8; 32] = rand::random();
        let key_id: [u8; 8] = rand::random();
        Self {
            key_id: hex::encode(key_id),
            secret: hex::encode(secret),
        }
    }
}

/// Input for adding a node to a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    pub account_id: String,
    pub region: String,
    pub bucket: String,
    pub endpoint: String,
}

impl Node {
    /// Name of a cloud resource belonging to `project`/`stage` on this node.
    pub fn resource_name(&self, project: &str, stage: &str, name: &str) -> String {
        format!("{}-{}-{}-{}", project, stage, name, self.id)
    }
}
