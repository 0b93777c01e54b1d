//! Reconciliation of a stage against freshly observed local artifacts.
//!
//! [`apply_changes`] computes added/removed/updated sets for functions and
//! public sites, mutates the stage to match, and re-applies the layered
//! function configuration. The returned [`Diff`] tells the deploy
//! orchestrator what to upload and which kind of backend call to make.

mod diff;

pub use diff::*;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    validate_function_name, validate_name, EnvironmentConfig, ModelError, NameKind, Stage,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A name and content hash observed on disk right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub hash: String,
}

impl Resource {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// Everything observed locally for one deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalResources {
    pub functions: Vec<Resource>,
    pub public: Vec<Resource>,
}

/// Bring `stage` in line with `local` and report what changed.
///
/// All added names are validated before the stage is touched; an invalid
/// name fails the whole call and leaves the stage as it was.
pub fn apply_changes(
    stage: &mut Stage,
    local: &LocalResources,
    environment: &EnvironmentConfig,
) -> Result<Diff, ReconcileError> {
    let local_functions = by_name(&local.functions);
    let local_sites = by_name(&local.public);

    let (fn_added, fn_removed) = set_diff(local_functions.keys(), &stage.function_names());
    let (site_added, site_removed) = set_diff(local_sites.keys(), &stage.site_names());

    for name in &fn_added {
        validate_function_name(name)?;
    }
    for name in &site_added {
        validate_name(NameKind::PublicSite, name)?;
    }
    // Storage keys need the project name; fail before mutating if unwired.
    if !local_functions.is_empty() {
        stage.project_name()?;
    }

    let mut diff = Diff::default();

    stage.add_functions(&fn_added[..])?;
    stage.remove_functions(&fn_removed[..]);
    let (updated, unchanged) = update_function_hashes(stage, &local_functions)?;
    diff.functions = ResourceDiff {
        added: fn_added,
        removed: fn_removed,
        updated,
        unchanged,
    };

    stage.add_sites(&site_added[..])?;
    stage.remove_sites(&site_removed[..]);
    let (updated, unchanged) = update_site_hashes(stage, &local_sites);
    diff.public = ResourceDiff {
        added: site_added,
        removed: site_removed,
        updated,
        unchanged,
    };

    diff.config_changed = apply_configuration(stage, environment);

    tracing::debug!(
        stage = %stage.name,
        added = diff.added_count(),
        updated = diff.updated_count(),
        removed = diff.removed_count(),
        config_changed = diff.config_changed,
        "Reconciled stage"
    );

    Ok(diff)
}

/// Re-merge every function's configuration from the environment layers.
/// Returns whether any function changed.
pub fn apply_configuration(stage: &mut Stage, environment: &EnvironmentConfig) -> bool {
    let stage_name = stage.name.clone();
    let mut changed = false;
    for function in &mut stage.functions {
        let sources = environment.sources_for(&stage_name, &function.name);
        if function.configuration.merge(&sources) {
            tracing::debug!(function = %function.name, "Function configuration changed");
            changed = true;
        }
    }
    changed
}

fn by_name(resources: &[Resource]) -> BTreeMap<String, String> {
    resources
        .iter()
        .map(|r| (r.name.clone(), r.hash.clone()))
        .collect()
}

/// `(local − existing, existing − local)`, both sorted.
fn set_diff<'a, I>(local: I, existing: &BTreeSet<String>) -> (Vec<String>, Vec<String>)
where
    I: Iterator<Item = &'a String>,
{
    let local: BTreeSet<String> = local.cloned().collect();
    let added = local.difference(existing).cloned().collect();
    let removed = existing.difference(&local).cloned().collect();
    (added, removed)
}

fn update_function_hashes(
    stage: &mut Stage,
    local: &BTreeMap<String, String>,
) -> Result<(Vec<String>, Vec<String>), ModelError> {
    let mut updated = Vec::new();
    let mut unchanged = Vec::new();
    for (name, hash) in local {
        let unchanged_hash = stage
            .function(name)
            .map(|f| f.hash() == hash.as_str())
            .unwrap_or(false);
        if unchanged_hash {
            unchanged.push(name.clone());
            continue;
        }
        let key = stage.storage_key(name, hash)?;
        if let Some(function) = stage.function_mut(name) {
            function.set_artifact(hash.clone(), key);
            updated.push(name.clone());
        }
    }
    Ok((updated, unchanged))
}

fn update_site_hashes(
    stage: &mut Stage,
    local: &BTreeMap<String, String>,
) -> (Vec<String>, Vec<String>) {
    let mut updated = Vec::new();
    let mut unchanged = Vec::new();
    for (name, hash) in local {
        match stage.site_mut(name) {
            Some(site) if site.hash == *hash => unchanged.push(name.clone()),
            Some(site) => {
                site.hash = hash.clone();
                updated.push(name.clone());
            }
            None => {}
        }
    }
    (updated, unchanged)
}
