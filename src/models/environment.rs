use serde::{Deserialize, Serialize};

use super::FunctionConfiguration;

/// The configuration overlay document (`config/environment.yml`).
///
/// ```yaml
/// project:
///   memory_size: 512
///   env:
///     LOG_LEVEL: info
///   stages:
///     - name: production
///       memory_size: 1024
///       functions:
///         - name: report
///           timeout: 300
///           cron: "cron(0 6 * * ? *)"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub project: ProjectEnvironment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEnvironment {
    #[serde(flatten)]
    pub configuration: FunctionConfiguration,
    #[serde(default)]
    pub stages: Vec<StageEnvironment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEnvironment {
    pub name: String,
    #[serde(flatten)]
    pub configuration: FunctionConfiguration,
    #[serde(default)]
    pub functions: Vec<FunctionEnvironment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEnvironment {
    pub name: String,
    #[serde(flatten)]
    pub configuration: FunctionConfiguration,
}

impl EnvironmentConfig {
    /// Configuration layers for one function, lowest priority first:
    /// defaults, project, stage, function.
    pub fn sources_for(&self, stage: &str, function: &str) -> Vec<FunctionConfiguration> {
        let mut sources = vec![
            FunctionConfiguration::defaults(),
            self.project.configuration.clone(),
        ];
        if let Some(stage_env) = self.project.stages.iter().find(|s| s.name == stage) {
            sources.push(stage_env.configuration.clone());
            if let Some(fn_env) = stage_env.functions.iter().find(|f| f.name == function) {
                sources.push(fn_env.configuration.clone());
            }
        }
        sources
    }
}
