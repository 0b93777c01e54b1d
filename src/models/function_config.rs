use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MEMORY_SIZE: u32 = 128;
pub const DEFAULT_TIMEOUT: u32 = 60;

/// Runtime settings of one deployed function.
///
/// The same type is used for every configuration layer (defaults, project,
/// stage, function). A "zero" field (0, empty, `None`, `false`) means the
/// layer does not set it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfiguration {
    /// Memory in MB.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub memory_size: u32,
    /// Timeout in seconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Schedule expression, e.g. `cron(0 12 * * ? *)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Private functions require a signed token on every request.
    #[serde(default, skip_serializing_if = "is_false")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub keep_warm: bool,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FunctionConfiguration {
    /// The lowest-priority layer applied to every function.
    pub fn defaults() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            timeout: DEFAULT_TIMEOUT,
            ..Self::default()
        }
    }

    /// Replace this configuration with the merge of `sources`, ordered from
    /// lowest to highest priority.
    ///
    /// Scalars are overwritten whenever a source sets a non-zero value; `env`
    /// is unioned key by key with later sources winning. Returns whether the
    /// result differs from the previous value, so merging the same sources
    /// twice reports `false` the second time.
    pub fn merge<'a, I>(&mut self, sources: I) -> bool
    where
        I: IntoIterator<Item = &'a FunctionConfiguration>,
    {
        let mut merged = FunctionConfiguration::default();
        for source in sources {
            merged.overlay(source);
        }
        let changed = merged != *self;
        *self = merged;
        changed
    }

    fn overlay(&mut self, source: &FunctionConfiguration) {
        if source.memory_size != 0 {
            self.memory_size = source.memory_size;
        }
        if source.timeout != 0 {
            self.timeout = source.timeout;
        }
        for (key, value) in &source.env {
            self.env.insert(key.clone(), value.clone());
        }
        if let Some(cron) = source.cron.as_ref().filter(|c| !c.is_empty()) {
            self.cron = Some(cron.clone());
        }
        if source.private {
            self.private = true;
        }
        if source.keep_warm {
            self.keep_warm = true;
        }
    }
}
