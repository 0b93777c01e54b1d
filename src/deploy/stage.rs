//! Creating and tearing down stages.

use super::DeployError;
use crate::backend::{DestroyRequest, StageBackend};
use crate::models::{Project, Workspace};
use crate::store::ProjectStore;

/// Add a stage bound to `node` (or the workspace default node) and persist.
pub fn new_stage(
    store: &ProjectStore,
    project: &mut Project,
    workspace: &Workspace,
    name: &str,
    node: Option<&str>,
) -> Result<(), DeployError> {
    let node = workspace.resolve_node(node)?.name.clone();

    let mut updated = project.clone();
    updated.add_stage(name, &node)?;
    updated.wire_up(workspace);
    store.save(&updated)?;
    *project = updated;

    tracing::info!(project = %project.name, stage = %name, %node, "Created stage");
    Ok(())
}

/// Tear the stage down on its node, then forget it locally and persist.
///
/// A stage that was never deployed has nothing remote to destroy.
pub async fn destroy_stage(
    store: &ProjectStore,
    project: &mut Project,
    name: &str,
    backend: &dyn StageBackend,
) -> Result<(), DeployError> {
    let stage = project.resolve_stage(Some(name))?;

    if stage.last_deployment.is_some() {
        let req = DestroyRequest {
            project: stage.project_name()?.to_string(),
            stage: stage.name.clone(),
            node_id: stage.node_ref()?.id.clone(),
        };
        backend.destroy(&req).await.map_err(DeployError::Destroy)?;
    } else {
        tracing::debug!(stage = %name, "Stage was never deployed, skipping remote teardown");
    }

    let mut updated = project.clone();
    updated.remove_stage(name)?;
    store.save(&updated)?;
    *project = updated;

    tracing::info!(project = %project.name, stage = %name, "Destroyed stage");
    Ok(())
}
