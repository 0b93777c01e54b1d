use serde::Serialize;

/// Changes to one resource kind, each list sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Names whose content hash changed, including newly added ones.
    pub updated: Vec<String>,
    /// Surviving names whose hash did not change.
    pub unchanged: Vec<String>,
}

impl ResourceDiff {
    pub fn has_updates(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.updated.is_empty()
    }

    pub fn topology_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Result of reconciling a stage against the local artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub functions: ResourceDiff,
    pub public: ResourceDiff,
    /// Some function's merged configuration differs from what was recorded.
    pub config_changed: bool,
}

impl Diff {
    pub fn has_updates(&self) -> bool {
        self.has_function_updates() || self.has_public_updates() || self.config_changed
    }

    pub fn has_function_updates(&self) -> bool {
        self.functions.has_updates()
    }

    pub fn has_public_updates(&self) -> bool {
        self.public.has_updates()
    }

    /// Whether the backend needs a full topology provisioning call rather
    /// than a code-only update.
    pub fn infrastructure_changed(&self) -> bool {
        self.functions.topology_changed() || self.public.topology_changed() || self.config_changed
    }

    pub fn updated_functions(&self) -> &[String] {
        &self.functions.updated
    }

    pub fn updated_public_sites(&self) -> &[String] {
        &self.public.updated
    }

    pub fn added_count(&self) -> usize {
        self.functions.added.len() + self.public.added.len()
    }

    pub fn updated_count(&self) -> usize {
        self.functions.updated.len() + self.public.updated.len()
    }

    pub fn removed_count(&self) -> usize {
        self.functions.removed.len() + self.public.removed.len()
    }
}
