//! The provisioning service: transactional reconciliation between the
//! persisted interface state and the live WireGuard runtime.
//!
//! Every mutating operation is revision-checked (optimistic concurrency),
//! plannable as a dry run, and rolled back with compensating operations when
//! the runtime fails partway. Mutations are recorded in a bounded in-memory
//! audit ring per interface.

pub mod audit;
pub mod error;
pub mod ops;
pub mod service;
pub mod views;

pub use audit::{AuditEntry, AuditPage, AuditRing, AUDIT_CAPACITY};
pub use error::{ProvisionError, Result};
pub use ops::{
    peer_spec, ApplyRequest, ApplyResponse, NewPeer, OpSummary, PeerOperation, PeerPatch,
    ReconcileMode, ReconcileRequest, ReconcileResult, RuntimeOp, ToggleRequest,
};
pub use service::{DeployResult, Deployment, ProvisionService};
pub use views::{mask_key, InterfaceDetails, InterfaceSummary, PeerView};
