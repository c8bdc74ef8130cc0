//! Error taxonomy for provisioning operations.

use thiserror::Error;
use wgmesh_runtime::RuntimeError;
use wgmesh_state::StateError;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors surfaced by the provisioning service.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The caller's revision does not match the interface's.
    #[error("revision conflict: expected {expected}, received {received}")]
    RevisionConflict {
        /// The revision currently persisted.
        expected: u64,
        /// The revision the caller supplied.
        received: u64,
    },

    /// The interface exists neither in state nor at runtime.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    /// Runtime mutation failed; compensation has already run.
    #[error("apply failed: {0}")]
    ApplyFailed(String),

    /// A request failed shape or semantic validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State store failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// Runtime adapter failure outside a rollback-protected section.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
