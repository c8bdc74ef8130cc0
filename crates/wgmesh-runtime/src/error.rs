//! Error types for runtime adapter operations.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the runtime control surface.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An external command exited unsuccessfully.
    #[error("{message}")]
    Command {
        /// Human-readable summary of what failed.
        message: String,
        /// Exit code, when the process exited at all.
        code: Option<i32>,
        /// Captured stderr, when non-empty.
        stderr: Option<String>,
    },

    /// Spawning or talking to the external tool failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `wg show … dump` output did not match the expected shape.
    #[error("unparseable dump output: {0}")]
    Dump(String),
}

impl RuntimeError {
    /// Builds a command failure from captured output.
    #[must_use]
    pub fn command(message: impl Into<String>, code: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        Self::Command {
            message: message.into(),
            code,
            stderr: (!stderr.is_empty()).then(|| stderr.to_string()),
        }
    }

    /// Whether the error's diagnostics indicate a missing interface.
    #[must_use]
    pub fn is_not_exists(&self) -> bool {
        let Self::Command { stderr, .. } = self else {
            return false;
        };
        stderr.as_deref().is_some_and(|s| {
            s.contains("No such device") || s.contains("Unable to access interface")
        })
    }
}
