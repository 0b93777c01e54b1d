//! Local persisted state: the per-project state file and the workspace file.

pub mod document;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::models::{EnvironmentConfig, Project, Workspace};

/// Project state file, relative to the project root.
pub const STATE_FILE: &str = "config/state.yml";
/// Configuration overlay, relative to the project root.
pub const ENVIRONMENT_FILE: &str = "config/environment.yml";

const WORKSPACE_FILE: &str = "workspace.yml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid state document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("State document version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("No stackmate project found in {0} or any parent directory")]
    ProjectNotFound(PathBuf),

    #[error("Could not determine data directory")]
    NoDataDir,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectState {
    project: Project,
}

/// Reads and writes one project's state file.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk up from `start` to the first directory holding a state file.
    pub fn discover(start: &Path) -> Result<Self, StoreError> {
        start
            .ancestors()
            .find(|dir| dir.join(STATE_FILE).is_file())
            .map(Self::new)
            .ok_or_else(|| StoreError::ProjectNotFound(start.to_path_buf()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.state_path().is_file()
    }

    /// Load the project and wire its stages up against `workspace`.
    pub fn load(&self, workspace: &Workspace) -> Result<Project, StoreError> {
        let path = self.state_path();
        let content = read(&path)?;
        let state: ProjectState = document::parse(&content)?;
        let mut project = state.project;
        project.normalize_default();
        project.wire_up(workspace);
        Ok(project)
    }

    pub fn save(&self, project: &Project) -> Result<(), StoreError> {
        let content = document::render(&ProjectState {
            project: project.clone(),
        })?;
        write_atomic(&self.state_path(), &content)
    }

    /// Load the configuration overlay. A missing file means no overrides.
    pub fn load_environment(&self) -> Result<EnvironmentConfig, StoreError> {
        let path = self.root.join(ENVIRONMENT_FILE);
        if !path.exists() {
            return Ok(EnvironmentConfig::default());
        }
        let content = read(&path)?;
        if content.trim().is_empty() {
            return Ok(EnvironmentConfig::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Reads and writes the workspace file.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    path: PathBuf,
}

impl WorkspaceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use the configured path, or `workspace.yml` in the platform data dir.
    pub fn open_default(config: &RuntimeConfig) -> Result<Self, StoreError> {
        if let Some(path) = &config.workspace_path {
            return Ok(Self::open(path.clone()));
        }
        Ok(Self::open(data_dir()?.join(WORKSPACE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the workspace, creating (and saving) a fresh one on first use.
    pub fn load_or_create(&self, name: &str) -> Result<Workspace, StoreError> {
        if self.path.exists() {
            let content = read(&self.path)?;
            return document::parse(&content);
        }
        let workspace = Workspace::new(name);
        self.save(&workspace)?;
        tracing::info!(path = %self.path.display(), "Created workspace");
        Ok(workspace)
    }

    pub fn save(&self, workspace: &Workspace) -> Result<(), StoreError> {
        write_atomic(&self.path, &document::render(workspace)?)
    }
}

/// The platform data directory for stackmate.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    directories::ProjectDirs::from("", "", "stackmate")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StoreError::NoDataDir)
}

fn read(path: &Path) -> Result<String, StoreError> {
    std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Write through a sibling temp file renamed into place.
fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("yml.tmp");
    std::fs::write(&tmp, content).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)
}
