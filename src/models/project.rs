use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{validate_name, ModelError, NameKind, Stage, StageContext, Workspace};

/// A named deployable unit.
///
/// Projects own an ordered list of stages. Whenever there is at least one
/// stage, exactly one of them is marked `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        validate_name(NameKind::Project, &name)?;
        Ok(Self {
            name,
            stages: Vec::new(),
        })
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn default_stage(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| s.default)
    }

    pub fn default_stage_mut(&mut self) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.default)
    }

    /// The named stage, or the default one when no name is given.
    pub fn resolve_stage(&self, name: Option<&str>) -> Result<&Stage, ModelError> {
        match name {
            Some(name) => self.stage(name).ok_or_else(|| stage_not_found(name)),
            None => self.default_stage().ok_or(ModelError::NoStages),
        }
    }

    pub fn resolve_stage_mut(&mut self, name: Option<&str>) -> Result<&mut Stage, ModelError> {
        match name {
            Some(name) => self.stage_mut(name).ok_or_else(|| stage_not_found(name)),
            None => self.default_stage_mut().ok_or(ModelError::NoStages),
        }
    }

    /// Add a stage bound to `node`. The first stage becomes the default.
    pub fn add_stage(&mut self, name: &str, node: &str) -> Result<&mut Stage, ModelError> {
        validate_name(NameKind::Stage, name)?;
        if self.stage(name).is_some() {
            return Err(ModelError::AlreadyExists {
                kind: NameKind::Stage,
                name: name.to_string(),
            });
        }

        let mut stage = Stage::new(name, node);
        stage.default = self.stages.is_empty();
        stage.set_context(StageContext {
            project: self.name.clone(),
            node: None,
        });
        self.stages.push(stage);
        let idx = self.stages.len() - 1;
        Ok(&mut self.stages[idx])
    }

    /// Remove a stage locally. If it was the default, the first remaining
    /// stage becomes the default.
    pub fn remove_stage(&mut self, name: &str) -> Result<Stage, ModelError> {
        let idx = self
            .stages
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| stage_not_found(name))?;
        let removed = self.stages.remove(idx);
        if removed.default {
            if let Some(first) = self.stages.first_mut() {
                first.default = true;
            }
        }
        Ok(removed)
    }

    pub fn set_default_stage(&mut self, name: &str) -> Result<(), ModelError> {
        if self.stage(name).is_none() {
            return Err(stage_not_found(name));
        }
        for stage in &mut self.stages {
            stage.default = stage.name == name;
        }
        Ok(())
    }

    /// Populate every stage's lookup context from the workspace.
    ///
    /// Run after loading persisted state. A stage whose node is missing from
    /// the workspace keeps `node: None`; lookups needing it report
    /// [`ModelError::Unwired`].
    pub fn wire_up(&mut self, workspace: &Workspace) {
        for stage in &mut self.stages {
            let node = workspace.node(&stage.node).cloned().map(Arc::new);
            stage.set_context(StageContext {
                project: self.name.clone(),
                node,
            });
        }
    }

    /// Repair the default-stage invariant after loading hand-edited state.
    pub fn normalize_default(&mut self) {
        let defaults = self.stages.iter().filter(|s| s.default).count();
        if defaults == 1 || self.stages.is_empty() {
            return;
        }
        let keep = self.stages.iter().position(|s| s.default).unwrap_or(0);
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.default = i == keep;
        }
    }
}

fn stage_not_found(name: &str) -> ModelError {
    ModelError::NotFound {
        kind: NameKind::Stage,
        name: name.to_string(),
    }
}
