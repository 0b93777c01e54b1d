//! Domain models for stackmate.
//!
//! # Ownership
//!
//! - [`Workspace`]: one developer's configuration. Owns the [`Node`]s (cloud
//!   account bindings) and remembers which local projects it has seen.
//! - [`Project`]: a named deployable unit owning an ordered list of [`Stage`]s,
//!   exactly one of which is the default.
//! - [`Stage`]: one deployment target bound to a node. Owns its [`Function`]s
//!   and [`PublicSite`]s plus the endpoints resolved by the last backend apply.
//!
//! Stages also carry a [`StageContext`] with the project name and the bound
//! node. It is filled in by [`Project::wire_up`] after loading persisted state,
//! is never serialized and is only used for lookups such as naming and tags.

mod environment;
mod function;
mod function_config;
mod naming;
mod node;
mod project;
mod site;
mod stage;
mod workspace;

pub use environment::*;
pub use function::*;
pub use function_config::*;
pub use naming::*;
pub use node::*;
pub use project::*;
pub use site::*;
pub use stage::*;
pub use workspace::*;

use thiserror::Error;

/// Errors raised by domain model invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: NameKind,
        name: String,
        reason: String,
    },

    #[error("'{0}' is a reserved function name")]
    ReservedName(String),

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: NameKind, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: NameKind, name: String },

    #[error("Project has no stages; create one with `stackmate stage new`")]
    NoStages,

    #[error("Stage '{0}' is not wired to a project")]
    Unwired(String),
}
