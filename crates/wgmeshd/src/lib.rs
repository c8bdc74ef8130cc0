//! HTTP surface for the WireGuard mesh provisioning service.
//!
//! Thin by design: handlers validate shapes, call into
//! [`wgmesh_provision::ProvisionService`], and wrap results in
//! `{ok, data|error}` envelopes with stable error codes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use routes::{create_router, AppState};
