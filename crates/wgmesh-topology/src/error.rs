//! Error types for mesh resolution and synthesis.

use thiserror::Error;
use wgmesh_wire::WireError;

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors that can occur while resolving or synthesizing a mesh.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The network CIDR failed to parse or is unsupported.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// The network cannot hold the requested peers.
    #[error("network {cidr} cannot hold {role} #{index}")]
    CapacityExceeded {
        /// The network that ran out of addresses.
        cidr: String,
        /// "node" or "client".
        role: &'static str,
        /// Zero-based position of the peer that did not fit.
        index: usize,
    },

    /// A gateway name does not match any node.
    #[error("unknown gateway node: {0}")]
    UnknownGateway(String),

    /// A peer is missing required key material.
    #[error("missing key for peer: {0}")]
    MissingKey(String),

    /// A supplied key failed to decode.
    #[error("invalid key for peer {peer}: {reason}")]
    InvalidKey {
        /// The peer carrying the bad key.
        peer: String,
        /// Decoder diagnostic.
        reason: String,
    },

    /// The spec failed shape validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Bundling the artifacts into an archive failed.
    #[error("archive error: {0}")]
    Archive(String),
}

impl From<WireError> for TopologyError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::InvalidCidr(msg) => Self::InvalidCidr(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}
