use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{validate_name, ModelError, NameKind, NewNode, Node, NodeKeys};

/// Root of one developer's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Local projects this workspace has deployed.
    #[serde(default)]
    pub projects: Vec<WorkspaceProject>,
}

/// A local project known to the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceProject {
    pub name: String,
    /// Absolute path to the project root on the local file system.
    pub path: String,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes: Vec::new(),
            projects: Vec::new(),
        }
    }

    // ============================================================
    // Nodes
    // ============================================================

    /// Add a node, generating its key material and resource suffix.
    /// The first node added becomes the default.
    pub fn add_node(&mut self, input: NewNode) -> Result<&Node, ModelError> {
        validate_name(NameKind::Node, &input.name)?;
        if self.node(&input.name).is_some() {
            return Err(ModelError::AlreadyExists {
                kind: NameKind::Node,
                name: input.name,
            });
        }

        let node = Node {
            id: self.unique_node_id(),
            name: input.name,
            account_id: input.account_id,
            region: input.region,
            bucket: input.bucket,
            endpoint: input.endpoint,
            keys: NodeKeys::generate(),
            default: self.nodes.is_empty(),
        };
        self.nodes.push(node);
        let idx = self.nodes.len() - 1;
        Ok(&self.nodes[idx])
    }

    /// Remove a node. If it was the default, the next remaining node takes over.
    pub fn remove_node(&mut self, name: &str) -> Result<Node, ModelError> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| ModelError::NotFound {
                kind: NameKind::Node,
                name: name.to_string(),
            })?;
        let removed = self.nodes.remove(idx);
        if removed.default {
            if let Some(first) = self.nodes.first_mut() {
                first.default = true;
            }
        }
        Ok(removed)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn default_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.default)
    }

    /// Look up a node by name, or the default node when no name is given.
    pub fn resolve_node(&self, name: Option<&str>) -> Result<&Node, ModelError> {
        match name {
            Some(name) => self.node(name).ok_or_else(|| ModelError::NotFound {
                kind: NameKind::Node,
                name: name.to_string(),
            }),
            None => self.default_node().ok_or_else(|| ModelError::NotFound {
                kind: NameKind::Node,
                name: "<default>".to_string(),
            }),
        }
    }

    fn unique_node_id(&self) -> String {
        loop {
            let candidate = Uuid::new_v4().simple().to_string()[..7].to_string();
            if !self.nodes.iter().any(|n| n.id == candidate) {
                return candidate;
            }
        }
    }

    // ============================================================
    // Projects
    // ============================================================

    /// Remember a local project. Re-registering updates the path.
    pub fn register_project(&mut self, name: &str, path: &str) {
        match self.projects.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.path = path.to_string(),
            None => self.projects.push(WorkspaceProject {
                name: name.to_string(),
                path: path.to_string(),
            }),
        }
    }

    pub fn forget_project(&mut self, name: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| p.name != name);
        self.projects.len() != before
    }
}
