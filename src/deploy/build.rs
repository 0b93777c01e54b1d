//! The external build step.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::process::Command;

use super::archive::{self, ArchiveError};
use crate::config::RuntimeConfig;

/// Keep only the end of compiler output in error messages.
const STDERR_TAIL: usize = 2000;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Build command is empty")]
    EmptyCommand,

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build exited with {status}:\n{stderr}")]
    Failed { status: String, stderr: String },

    #[error("Build succeeded but produced no artifact at {0}")]
    MissingArtifact(PathBuf),

    #[error(transparent)]
    Hash(#[from] ArchiveError),
}

/// A successfully built function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    pub path: PathBuf,
    /// SHA-256 of the artifact bytes.
    pub hash: String,
}

/// Turns a function source directory into a deployable executable.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, name: &str, dir: &Path) -> Result<BuiltArtifact, BuildError>;
}

/// Runs the configured build command inside the function directory.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    command: Vec<String>,
    artifact_name: String,
}

impl CommandBuilder {
    pub fn new(command: Vec<String>, artifact_name: impl Into<String>) -> Self {
        Self {
            command,
            artifact_name: artifact_name.into(),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.build_command.clone(), config.artifact_name.clone())
    }
}

#[async_trait]
impl ArtifactBuilder for CommandBuilder {
    async fn build(&self, name: &str, dir: &Path) -> Result<BuiltArtifact, BuildError> {
        let (program, args) = self.command.split_first().ok_or(BuildError::EmptyCommand)?;

        tracing::debug!(function = %name, dir = %dir.display(), "Building");
        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let start = (start..stderr.len())
                .find(|i| stderr.is_char_boundary(*i))
                .unwrap_or(stderr.len());
            return Err(BuildError::Failed {
                status: output.status.to_string(),
                stderr: stderr[start..].trim().to_string(),
            });
        }

        let path = dir.join(&self.artifact_name);
        if !path.is_file() {
            return Err(BuildError::MissingArtifact(path));
        }
        let hash = archive::hash_file(&path)?;
        Ok(BuiltArtifact { path, hash })
    }
}

/// Build every function concurrently. Results come back in input order, each
/// attributed to its function name.
pub async fn build_all(
    builder: &dyn ArtifactBuilder,
    functions: &[(String, PathBuf)],
) -> Vec<(String, Result<BuiltArtifact, BuildError>)> {
    let builds = functions
        .iter()
        .map(|(name, dir)| async move { (name.clone(), builder.build(name, dir).await) });
    join_all(builds).await
}
