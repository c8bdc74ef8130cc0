//! Error types for the state store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state-store operations.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while loading or persisting state.
#[derive(Debug, Error)]
pub enum StateError {
    /// The lock could not be acquired inside the retry window.
    #[error("timed out waiting for state lock at {0}")]
    LockTimeout(PathBuf),

    /// The on-disk document does not match the expected schema.
    #[error("corrupt state file: {0}")]
    CorruptState(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the state failed.
    #[error("serialize error: {0}")]
    Serialize(String),
}
