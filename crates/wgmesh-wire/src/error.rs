//! Error types for key and address-plan operations.

use thiserror::Error;

/// Result type alias for wire-level operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors that can occur during key or address-plan operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// Invalid key material.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid CIDR notation.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// An address offset fell outside the network.
    #[error("address {offset} past the end of {cidr}")]
    AddressOutOfRange {
        /// The requested offset from the network base.
        offset: u32,
        /// The network the offset was resolved against.
        cidr: String,
    },
}
