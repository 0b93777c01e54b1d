use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    validate_function_name, validate_name, Function, ModelError, NameKind, Node, PublicSite,
};

/// One named deployment target of a project, bound to exactly one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub default: bool,
    /// Name of the workspace node this stage deploys to.
    pub node: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub public: Vec<PublicSite>,
    /// Set only after a successful backend apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<StageEndpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<DateTime<Utc>>,
    #[serde(skip)]
    ctx: StageContext,
}

/// Network endpoints resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEndpoints {
    pub rest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<String>,
}

/// Lookup-only links from a stage to its project and node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageContext {
    pub project: String,
    pub node: Option<Arc<Node>>,
}

impl Stage {
    pub fn new(name: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: false,
            node: node.into(),
            functions: Vec::new(),
            public: Vec::new(),
            endpoints: None,
            public_bucket: None,
            last_deployment: None,
            ctx: StageContext::default(),
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub(crate) fn set_context(&mut self, ctx: StageContext) {
        self.ctx = ctx;
    }

    pub fn project_name(&self) -> Result<&str, ModelError> {
        if self.ctx.project.is_empty() {
            return Err(ModelError::Unwired(self.name.clone()));
        }
        Ok(&self.ctx.project)
    }

    pub fn node_ref(&self) -> Result<&Node, ModelError> {
        self.ctx
            .node
            .as_deref()
            .ok_or_else(|| ModelError::Unwired(self.name.clone()))
    }

    // ============================================================
    // Functions
    // ============================================================

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn function_names(&self) -> BTreeSet<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }

    /// Append functions with default configuration.
    ///
    /// Every name is validated before anything is appended, so a batch with
    /// one bad or duplicate name leaves the stage untouched.
    pub fn add_functions<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), ModelError> {
        let names = dedup(names);
        for name in &names {
            validate_function_name(name)?;
            if self.function(name).is_some() {
                return Err(ModelError::AlreadyExists {
                    kind: NameKind::Function,
                    name: name.to_string(),
                });
            }
        }
        self.functions
            .extend(names.into_iter().map(|name| Function::new(name)));
        Ok(())
    }

    /// Remove functions by name. Unknown names are ignored.
    pub fn remove_functions<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let before = self.functions.len();
        self.functions
            .retain(|f| !names.iter().any(|n| n.as_ref() == f.name));
        before - self.functions.len()
    }

    // ============================================================
    // Public sites
    // ============================================================

    pub fn site(&self, name: &str) -> Option<&PublicSite> {
        self.public.iter().find(|s| s.name == name)
    }

    pub fn site_mut(&mut self, name: &str) -> Option<&mut PublicSite> {
        self.public.iter_mut().find(|s| s.name == name)
    }

    pub fn site_names(&self) -> BTreeSet<String> {
        self.public.iter().map(|s| s.name.clone()).collect()
    }

    /// Append public sites; same all-or-nothing validation as functions.
    pub fn add_sites<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), ModelError> {
        let names = dedup(names);
        for name in &names {
            validate_name(NameKind::PublicSite, name)?;
            if self.site(name).is_some() {
                return Err(ModelError::AlreadyExists {
                    kind: NameKind::PublicSite,
                    name: name.to_string(),
                });
            }
        }
        self.public
            .extend(names.into_iter().map(|name| PublicSite::new(name)));
        Ok(())
    }

    pub fn remove_sites<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let before = self.public.len();
        self.public
            .retain(|s| !names.iter().any(|n| n.as_ref() == s.name));
        before - self.public.len()
    }

    // ============================================================
    // Naming
    // ============================================================

    /// Object key for a function artifact with the given content hash.
    pub fn storage_key(&self, function: &str, hash: &str) -> Result<String, ModelError> {
        Ok(format!(
            "functions/{}/{}/{}-{}.zip",
            self.project_name()?,
            self.name,
            function,
            hash
        ))
    }

    /// Cloud resource name for `name` on this stage's node.
    pub fn resource_name(&self, name: &str) -> Result<String, ModelError> {
        Ok(self
            .node_ref()?
            .resource_name(self.project_name()?, &self.name, name))
    }

    /// Tags applied to every cloud resource of this stage.
    pub fn resource_tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("stackmate:project".to_string(), self.ctx.project.clone());
        tags.insert("stackmate:stage".to_string(), self.name.clone());
        if let Some(node) = &self.ctx.node {
            tags.insert("stackmate:node".to_string(), node.name.clone());
            tags.insert("stackmate:key".to_string(), node.id.clone());
        }
        tags
    }

    pub fn rest_endpoint(&self) -> Option<&str> {
        self.endpoints.as_ref().map(|e| e.rest.as_str())
    }
}

fn dedup<S: AsRef<str>>(names: &[S]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| seen.insert(*n))
        .collect()
}
