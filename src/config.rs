//! Process-wide configuration loaded once from environment variables.
//!
//! - `STACKMATE_BUCKET_PREFIX` - Prefix for per-node artifact buckets (default: `stackmate`)
//! - `STACKMATE_BUILD_COMMAND` - Build command run in each function directory
//! - `STACKMATE_ARTIFACT` - Built binary path inside the function directory (default: `bootstrap`)
//! - `STACKMATE_TOKEN_TTL` - Backend token lifetime in seconds (default: 900)
//! - `STACKMATE_REQUEST_TIMEOUT` - Outbound HTTP timeout in seconds (default: 900)
//! - `STACKMATE_WORKSPACE` - Explicit workspace file path
//! - `STACKMATE_OBJECT_ROOT` - Directory standing in for object storage

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BUILD_COMMAND: &str = "cargo lambda build --release --output-format binary";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got '{value}'")]
    InvalidSeconds { var: &'static str, value: String },

    #[error("STACKMATE_BUILD_COMMAND is empty")]
    EmptyBuildCommand,
}

/// Configuration handed to the deploy orchestrator, stores and invokers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub version: String,
    pub bucket_prefix: String,
    /// Program and arguments run inside each function directory.
    pub build_command: Vec<String>,
    /// Path of the built binary relative to the function directory.
    pub artifact_name: String,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    pub workspace_path: Option<PathBuf>,
    /// Local directory uploads are written to, one subdirectory per bucket.
    pub object_root: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            bucket_prefix: "stackmate".to_string(),
            build_command: DEFAULT_BUILD_COMMAND
                .split_whitespace()
                .map(String::from)
                .collect(),
            artifact_name: "bootstrap".to_string(),
            token_ttl: Duration::from_secs(900),
            request_timeout: Duration::from_secs(900),
            workspace_path: None,
            object_root: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("STACKMATE_BUCKET_PREFIX") {
            config.bucket_prefix = prefix;
        }
        if let Ok(command) = std::env::var("STACKMATE_BUILD_COMMAND") {
            let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
            if parts.is_empty() {
                return Err(ConfigError::EmptyBuildCommand);
            }
            config.build_command = parts;
        }
        if let Ok(artifact) = std::env::var("STACKMATE_ARTIFACT") {
            config.artifact_name = artifact;
        }
        if let Some(ttl) = seconds_var("STACKMATE_TOKEN_TTL")? {
            config.token_ttl = ttl;
        }
        if let Some(timeout) = seconds_var("STACKMATE_REQUEST_TIMEOUT")? {
            config.request_timeout = timeout;
        }
        config.workspace_path = std::env::var("STACKMATE_WORKSPACE").ok().map(PathBuf::from);
        config.object_root = std::env::var("STACKMATE_OBJECT_ROOT").ok().map(PathBuf::from);

        Ok(config)
    }

    /// Use a specific build command (mainly for tests).
    pub fn with_build_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_workspace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_path = Some(path.into());
        self
    }

    /// Name of the bucket public sites of `project`/`stage` are served from
    /// when the backend does not report one.
    pub fn public_bucket_name(&self, project: &str, stage: &str, node_id: &str) -> String {
        format!("{}-{}-{}-public-{}", self.bucket_prefix, project, stage, node_id)
    }
}

fn seconds_var(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
            _ => Err(ConfigError::InvalidSeconds { var, value }),
        },
        Err(_) => Ok(None),
    }
}
