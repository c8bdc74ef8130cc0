//! API error envelope and status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use wgmesh_provision::ProvisionError;
use wgmesh_topology::TopologyError;

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors as the HTTP surface reports them.
#[derive(Debug)]
pub enum ApiError {
    /// Input failed shape or semantic validation (400).
    Validation(String),
    /// Optimistic-concurrency rejection (409).
    RevisionConflict {
        /// The revision currently persisted.
        expected: u64,
        /// The revision the caller supplied.
        received: u64,
    },
    /// The interface exists nowhere (404).
    NotFound(String),
    /// Runtime mutation failed after compensation (500).
    ApplyFailed(String),
    /// Anything else (500).
    Internal(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RevisionConflict { .. } => "REVISION_CONFLICT",
            Self::NotFound(_) => "INTERFACE_NOT_FOUND",
            Self::ApplyFailed(_) => "APPLY_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RevisionConflict { .. } => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ApplyFailed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::ApplyFailed(msg) | Self::Internal(msg) => msg.clone(),
            Self::RevisionConflict { expected, received } => {
                format!("revision conflict: expected {expected}, received {received}")
            }
            Self::NotFound(name) => format!("interface not found: {name}"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::RevisionConflict { expected, received } => {
                Some(json!({"expected": expected, "received": received}))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code(),
            "message": self.message(),
        });
        if let Some(details) = self.details() {
            error["details"] = details;
        }
        let body = json!({"ok": false, "error": error});
        (self.status(), Json(body)).into_response()
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::RevisionConflict { expected, received } => {
                Self::RevisionConflict { expected, received }
            }
            ProvisionError::InterfaceNotFound(name) => Self::NotFound(name),
            ProvisionError::ApplyFailed(msg) => Self::ApplyFailed(msg),
            ProvisionError::Validation(msg) => Self::Validation(msg),
            other @ (ProvisionError::State(_) | ProvisionError::Runtime(_)) => {
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<TopologyError> for ApiError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::Archive(msg) => Self::Internal(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}
