//! The deploy orchestrator.
//!
//! One [`Deploy::run`] takes a stage from local sources to a live backend:
//! build every function, reconcile against the recorded state, upload the
//! changed artifacts, make one backend apply call, persist, then push
//! changed public sites. Any fatal failure before persisting leaves both the
//! in-memory project and the state file as they were before the run. A failed
//! site sync records the unsynced sites with their previous hashes, so the
//! next deploy uploads them again.

pub mod archive;
pub mod build;
pub mod stage;
pub mod sync;

pub use build::{build_all, ArtifactBuilder, BuildError, BuiltArtifact, CommandBuilder};
pub use stage::{destroy_stage, new_stage};
pub use sync::{sync_site, SyncError, SyncStats};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;

use crate::backend::{
    ApplyResponse, FunctionSpec, ProvisionRequest, SiteSpec, StageBackend, UpdateRequest,
};
use crate::cloud::{CloudClient, CloudError};
use crate::config::RuntimeConfig;
use crate::invoke::InvokeError;
use crate::models::{ModelError, NameKind, Project, Stage, StageEndpoints};
use crate::reconcile::{self, Diff, LocalResources, ReconcileError, Resource};
use crate::store::{ProjectStore, StoreError};
use archive::ArchiveError;

/// Function sources, one subdirectory per function.
pub const FUNCTIONS_DIR: &str = "functions";
/// Public site sources, one subdirectory per site.
pub const PUBLIC_DIR: &str = "public";

const ARTIFACT_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to scan {path}: {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("No built artifact for {0}")]
    MissingArtifact(String),

    #[error("Failed to upload {function}: {source}")]
    Upload {
        function: String,
        #[source]
        source: CloudError,
    },

    #[error("Backend apply failed: {0}")]
    Apply(#[source] InvokeError),

    #[error("Backend teardown failed: {0}")]
    Destroy(#[source] InvokeError),

    #[error("Failed to sync public site {site}: {source}")]
    SiteSync {
        site: String,
        #[source]
        source: SyncError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Idle,
    Building,
    Diffing,
    Uploading,
    Applying,
    Persisting,
    SyncingStatic,
    Done,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::Diffing => "diffing",
            Self::Uploading => "uploading",
            Self::Applying => "applying",
            Self::Persisting => "persisting",
            Self::SyncingStatic => "syncing-static",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// A function whose build failed and was left out of this deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBuild {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployTimings {
    pub build: Duration,
    pub upload: Duration,
    pub upload_bytes: u64,
    pub apply: Duration,
    pub sync: Duration,
    pub synced_files: usize,
    pub sync_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub project: String,
    pub stage: String,
    /// Local sources matched the recorded state; nothing was done.
    pub nothing_to_deploy: bool,
    pub diff: Diff,
    pub failed_builds: Vec<FailedBuild>,
    pub timings: DeployTimings,
}

/// One deploy of one stage.
pub struct Deploy<'a> {
    config: &'a RuntimeConfig,
    store: &'a ProjectStore,
    project: &'a mut Project,
    stage: Option<String>,
    builder: &'a dyn ArtifactBuilder,
    cloud: &'a dyn CloudClient,
    backend: &'a dyn StageBackend,
    phase: DeployPhase,
}

impl<'a> Deploy<'a> {
    /// `stage: None` deploys the project's default stage.
    pub fn new(
        config: &'a RuntimeConfig,
        store: &'a ProjectStore,
        project: &'a mut Project,
        stage: Option<&str>,
        builder: &'a dyn ArtifactBuilder,
        cloud: &'a dyn CloudClient,
        backend: &'a dyn StageBackend,
    ) -> Self {
        Self {
            config,
            store,
            project,
            stage: stage.map(String::from),
            builder,
            cloud,
            backend,
            phase: DeployPhase::Idle,
        }
    }

    pub async fn run(mut self) -> Result<DeployOutcome, DeployError> {
        // Work on a copy; it replaces the project's stage only when persisting.
        let mut stage = self.project.resolve_stage(self.stage.as_deref())?.clone();
        let project_name = self.project.name.clone();
        let environment = self.store.load_environment()?;
        let root = self.store.root().to_path_buf();
        let mut timings = DeployTimings::default();

        // Building
        self.enter(DeployPhase::Building);
        let started = Instant::now();
        let function_dirs = discover(&root.join(FUNCTIONS_DIR))?;
        let site_dirs = discover(&root.join(PUBLIC_DIR))?;

        let mut local = LocalResources::default();
        let mut artifacts = BTreeMap::new();
        let mut failed_builds = Vec::new();
        for (name, result) in build_all(self.builder, &function_dirs).await {
            match result {
                Ok(artifact) => {
                    local.functions.push(Resource::new(&name, &artifact.hash));
                    artifacts.insert(name, artifact.path);
                }
                Err(e) => {
                    tracing::warn!(function = %name, error = %e, "Build failed, skipping function");
                    // Keep the recorded hash so the function is neither removed nor updated.
                    if let Some(existing) = stage.function(&name) {
                        local.functions.push(Resource::new(&name, existing.hash()));
                    }
                    failed_builds.push(FailedBuild {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
        for (name, dir) in &site_dirs {
            local.public.push(Resource::new(name, archive::hash_dir(dir)?));
        }
        timings.build = started.elapsed();

        // Diffing
        self.enter(DeployPhase::Diffing);
        let previous = stage.clone();
        let diff = reconcile::apply_changes(&mut stage, &local, &environment)?;
        if !diff.has_updates() {
            self.enter(DeployPhase::Done);
            tracing::info!(project = %project_name, stage = %stage.name, "Nothing to deploy");
            return Ok(DeployOutcome {
                project: project_name,
                stage: stage.name,
                nothing_to_deploy: true,
                diff,
                failed_builds,
                timings,
            });
        }

        // Uploading
        self.enter(DeployPhase::Uploading);
        let started = Instant::now();
        let bucket = stage.node_ref()?.bucket.clone();
        let entry_name = Path::new(&self.config.artifact_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bootstrap".to_string());
        for name in diff.updated_functions() {
            let path = artifact_for(&artifacts, name)?;
            let function = stage.function(name).ok_or_else(|| ModelError::NotFound {
                kind: NameKind::Function,
                name: name.clone(),
            })?;
            let body = archive::zip_artifact(path, &entry_name)?;
            timings.upload_bytes += body.len() as u64;
            tracing::debug!(function = %name, key = %function.s3_key(), bytes = body.len(), "Uploading artifact");
            self.cloud
                .put_object(&bucket, function.s3_key(), body, Some(ARTIFACT_CONTENT_TYPE))
                .await
                .map_err(|source| DeployError::Upload {
                    function: name.clone(),
                    source,
                })?;
        }
        timings.upload = started.elapsed();

        // Applying
        self.enter(DeployPhase::Applying);
        let started = Instant::now();
        let response = if diff.infrastructure_changed() {
            let req = provision_request(&stage, &bucket)?;
            Some(self.backend.provision(&req).await.map_err(DeployError::Apply)?)
        } else if diff.has_function_updates() {
            let req = update_request(&stage, &bucket, diff.updated_functions())?;
            Some(self.backend.update(&req).await.map_err(DeployError::Apply)?)
        } else {
            tracing::debug!("Only public sites changed, skipping backend apply");
            None
        };
        if let Some(response) = response {
            refresh_stage(&mut stage, response);
        }
        stage.last_deployment = Some(Utc::now());
        timings.apply = started.elapsed();

        // Persisting
        self.enter(DeployPhase::Persisting);
        let mut updated = self.project.clone();
        let slot = updated
            .stage_mut(&stage.name)
            .ok_or_else(|| ModelError::NotFound {
                kind: NameKind::Stage,
                name: stage.name.clone(),
            })?;
        *slot = stage.clone();
        self.store.save(&updated)?;
        *self.project = updated;

        // SyncingStatic
        self.enter(DeployPhase::SyncingStatic);
        let started = Instant::now();
        let sites = diff.updated_public_sites();
        for (i, site) in sites.iter().enumerate() {
            let Some(dir) = site_dirs.iter().find(|(name, _)| name == site).map(|(_, d)| d) else {
                continue;
            };
            match self.sync_one(&stage, site, dir).await {
                Ok(stats) => {
                    timings.synced_files += stats.files;
                    timings.sync_bytes += stats.bytes;
                }
                Err(e) => {
                    self.restore_site_hashes(&previous, &sites[i..]);
                    return Err(e);
                }
            }
        }
        timings.sync = started.elapsed();

        self.enter(DeployPhase::Done);
        tracing::info!(
            project = %project_name,
            stage = %stage.name,
            added = diff.added_count(),
            updated = diff.updated_count(),
            removed = diff.removed_count(),
            failed_builds = failed_builds.len(),
            build_ms = timings.build.as_millis() as u64,
            upload_ms = timings.upload.as_millis() as u64,
            upload_bytes = timings.upload_bytes,
            apply_ms = timings.apply.as_millis() as u64,
            sync_ms = timings.sync.as_millis() as u64,
            synced_files = timings.synced_files,
            sync_bytes = timings.sync_bytes,
            "Deploy finished"
        );

        Ok(DeployOutcome {
            project: project_name,
            stage: stage.name,
            nothing_to_deploy: false,
            diff,
            failed_builds,
            timings,
        })
    }

    fn enter(&mut self, phase: DeployPhase) {
        tracing::info!(from = %self.phase, to = %phase, "Deploy phase");
        self.phase = phase;
    }

    async fn sync_one(&self, stage: &Stage, site: &str, dir: &Path) -> Result<SyncStats, DeployError> {
        let bucket = self.site_bucket(stage, site)?;
        sync_site(self.cloud, &bucket, site, dir)
            .await
            .map_err(|source| DeployError::SiteSync {
                site: site.to_string(),
                source,
            })
    }

    /// Put the pre-deploy hash back on `sites` and persist, so the next
    /// deploy sees them as changed. Sites new in this deploy get an empty hash.
    fn restore_site_hashes(&mut self, previous: &Stage, sites: &[String]) {
        let Some(current) = self.project.stage_mut(&previous.name) else {
            return;
        };
        for name in sites {
            let hash = previous.site(name).map(|s| s.hash.clone()).unwrap_or_default();
            if let Some(site) = current.site_mut(name) {
                site.hash = hash;
            }
        }
        tracing::warn!(sites = ?sites, "Public sites not synced, keeping their previous hashes");
        if let Err(e) = self.store.save(self.project) {
            tracing::error!(error = %e, "Failed to record unsynced public sites");
        }
    }

    /// The site's own bucket, else the stage's public bucket, else the
    /// conventional public bucket name for this stage.
    fn site_bucket(&self, stage: &Stage, site: &str) -> Result<String, DeployError> {
        if let Some(bucket) = stage.site(site).and_then(|s| s.bucket.clone()) {
            return Ok(bucket);
        }
        if let Some(bucket) = &stage.public_bucket {
            return Ok(bucket.clone());
        }
        Ok(self.config.public_bucket_name(
            stage.project_name()?,
            &stage.name,
            &stage.node_ref()?.id,
        ))
    }
}

fn artifact_for<'m>(artifacts: &'m BTreeMap<String, PathBuf>, name: &str) -> Result<&'m PathBuf, DeployError> {
    artifacts
        .get(name)
        .ok_or_else(|| DeployError::MissingArtifact(name.to_string()))
}

/// Sorted `(name, path)` of every non-hidden subdirectory of `dir`. A
/// missing directory has no entries.
fn discover(dir: &Path) -> Result<Vec<(String, PathBuf)>, DeployError> {
    let err = |source| DeployError::Discover {
        path: dir.to_path_buf(),
        source,
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(err)? {
        let entry = entry.map_err(err)?;
        if !entry.file_type().map_err(err)?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        found.push((name, entry.path()));
    }
    found.sort();
    Ok(found)
}

fn provision_request(stage: &Stage, bucket: &str) -> Result<ProvisionRequest, ModelError> {
    let functions = stage
        .functions
        .iter()
        .map(|f| FunctionSpec::from_function(stage, f))
        .collect::<Result<Vec<_>, _>>()?;
    let public = stage
        .public
        .iter()
        .map(|s| SiteSpec {
            name: s.name.clone(),
            hash: s.hash.clone(),
        })
        .collect();
    Ok(ProvisionRequest {
        project: stage.project_name()?.to_string(),
        stage: stage.name.clone(),
        node_id: stage.node_ref()?.id.clone(),
        bucket: bucket.to_string(),
        functions,
        public,
        tags: stage.resource_tags(),
    })
}

fn update_request(stage: &Stage, bucket: &str, updated: &[String]) -> Result<UpdateRequest, ModelError> {
    let functions = updated
        .iter()
        .filter_map(|name| stage.function(name))
        .map(|f| FunctionSpec::from_function(stage, f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(UpdateRequest {
        project: stage.project_name()?.to_string(),
        stage: stage.name.clone(),
        bucket: bucket.to_string(),
        functions,
    })
}

fn refresh_stage(stage: &mut Stage, response: ApplyResponse) {
    if let Some(rest) = response.rest_endpoint {
        stage.endpoints = Some(StageEndpoints {
            rest,
            ws: response.ws_endpoint,
        });
    }
    if response.public_bucket.is_some() {
        stage.public_bucket = response.public_bucket;
    }
    for status in response.sites {
        if let Some(site) = stage.site_mut(&status.name) {
            site.bucket = Some(status.bucket);
        }
    }
}
