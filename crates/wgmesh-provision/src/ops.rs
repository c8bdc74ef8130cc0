//! Request shapes, the operation union, and runtime-op planning.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wgmesh_runtime::PeerSpec;
use wgmesh_state::Peer;

/// A peer as submitted in an `add` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeer {
    /// Caller-chosen id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Base64 public key.
    pub public_key: String,
    /// Base64 private key, when managed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Allowed IPs in CIDR notation.
    pub allowed_ips: Vec<String>,
    /// `host:port` endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Keepalive seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
    /// Whether the peer should exist at runtime immediately.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl NewPeer {
    /// Materialises the managed peer, forcing the owning interface.
    #[must_use]
    pub fn into_peer(self, interface: &str) -> Peer {
        Peer {
            peer_id: self
                .peer_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            public_key: self.public_key,
            private_key: self.private_key,
            allowed_ips: self.allowed_ips,
            endpoint: self.endpoint,
            persistent_keepalive: self.persistent_keepalive,
            is_active: self.is_active,
            interface: interface.to_string(),
        }
    }
}

/// Partial update applied to an existing peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerPatch {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// New allowed IPs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
    /// New endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// New keepalive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
    /// New activity flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl PeerPatch {
    /// Applies the patch in place.
    pub fn apply_to(&self, peer: &mut Peer) {
        if let Some(name) = &self.name {
            peer.name.clone_from(name);
        }
        if let Some(public_key) = &self.public_key {
            peer.public_key.clone_from(public_key);
        }
        if let Some(allowed_ips) = &self.allowed_ips {
            peer.allowed_ips.clone_from(allowed_ips);
        }
        if let Some(endpoint) = &self.endpoint {
            peer.endpoint = Some(endpoint.clone());
        }
        if let Some(keepalive) = self.persistent_keepalive {
            peer.persistent_keepalive = Some(keepalive);
        }
        if let Some(is_active) = self.is_active {
            peer.is_active = is_active;
        }
    }
}

/// One declarative peer mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerOperation {
    /// Append a peer to the interface.
    Add {
        /// The peer to add.
        peer: NewPeer,
    },
    /// Patch an existing peer.
    Update {
        /// Target peer id.
        peer_id: String,
        /// Fields to change.
        patch: PeerPatch,
    },
    /// Flip a peer's activity.
    Toggle {
        /// Target peer id.
        peer_id: String,
        /// Desired activity.
        is_active: bool,
    },
    /// Drop a peer.
    Remove {
        /// Target peer id.
        peer_id: String,
    },
}

/// Per-kind counters for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpSummary {
    /// Peers appended.
    pub added: u32,
    /// Peers patched.
    pub updated: u32,
    /// Peers toggled.
    pub toggled: u32,
    /// Peers dropped.
    pub removed: u32,
}

/// `applyPeerOperations` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    /// Expected interface revision.
    pub revision: u64,
    /// Plan only; no mutations.
    #[serde(default)]
    pub dry_run: bool,
    /// Ordered operations.
    pub operations: Vec<PeerOperation>,
}

/// Either a dry-run plan or an apply acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ApplyResponse {
    /// Dry-run outcome: the plan that would execute.
    DryRun {
        /// Always true.
        dry_run: bool,
        /// Revision the plan was computed against.
        current_revision: u64,
        /// Revision a real apply would produce.
        next_revision: u64,
        /// One line per scheduled runtime op.
        plan: Vec<String>,
        /// Per-kind counters.
        summary: OpSummary,
    },
    /// Live outcome: runtime and state both updated.
    Applied {
        /// Always true.
        applied: bool,
        /// The new interface revision.
        revision: u64,
        /// Per-kind counters.
        summary: OpSummary,
    },
}

/// `toggleInterfaceState` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    /// Expected interface revision.
    pub revision: u64,
    /// Desired link state.
    pub is_up: bool,
    /// Report only; no mutations.
    #[serde(default)]
    pub dry_run: bool,
}

/// Drift repair direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Push intended state into the runtime.
    StateToRuntime,
    /// Absorb observed runtime into the state.
    RuntimeToState,
}

/// `reconcileInterface` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    /// Expected interface revision.
    pub revision: u64,
    /// Repair direction.
    pub mode: ReconcileMode,
}

/// Drift report after a reconcile pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// The direction that ran.
    pub mode: ReconcileMode,
    /// Whether any drift was observed.
    pub drift_found: bool,
    /// Public keys of active managed peers absent from runtime.
    pub missing_in_runtime: Vec<String>,
    /// Public keys of runtime peers with no managed counterpart.
    pub zombies: Vec<String>,
    /// Interface revision after the pass.
    pub revision: u64,
}

/// A scheduled runtime mutation, kept as a value so compensations can be
/// derived and logged after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeOp {
    /// Add a peer.
    Add {
        /// The peer attributes to apply.
        peer: PeerSpec,
    },
    /// Remove a peer (full spec retained for compensation).
    Remove {
        /// The peer being removed.
        peer: PeerSpec,
    },
    /// Re-apply attributes, retaining the previous set for compensation.
    Update {
        /// Attributes to apply.
        next: PeerSpec,
        /// Attributes to restore on rollback.
        previous: PeerSpec,
    },
}

impl RuntimeOp {
    /// The compensating operation undoing this one.
    #[must_use]
    pub fn compensation(&self) -> RuntimeOp {
        match self {
            Self::Add { peer } => Self::Remove { peer: peer.clone() },
            Self::Remove { peer } => Self::Add { peer: peer.clone() },
            Self::Update { next, previous } => Self::Update {
                next: previous.clone(),
                previous: next.clone(),
            },
        }
    }

    /// The dry-run plan line for this op.
    #[must_use]
    pub fn plan_line(&self, interface: &str) -> String {
        match self {
            Self::Add { peer } => format!(
                "[ADD] wg set {interface} peer {} allowed-ips {}",
                peer.public_key,
                peer.allowed_ips.join(",")
            ),
            Self::Remove { peer } => {
                format!("[REMOVE] wg set {interface} peer {} remove", peer.public_key)
            }
            Self::Update { next, .. } => format!(
                "[UPDATE] wg set {interface} peer {} allowed-ips {}",
                next.public_key,
                next.allowed_ips.join(",")
            ),
        }
    }
}

/// Projects a managed peer into the attributes the runtime applies.
#[must_use]
pub fn peer_spec(peer: &Peer) -> PeerSpec {
    PeerSpec {
        public_key: peer.public_key.clone(),
        preshared_key: None,
        allowed_ips: peer.allowed_ips.clone(),
        endpoint: peer.endpoint.clone(),
        persistent_keepalive: peer.persistent_keepalive,
    }
}
