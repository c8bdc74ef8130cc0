//! The transactional provisioning service.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wgmesh_runtime::{InterfaceProvision, RuntimeAdapter, RuntimeInterface};
use wgmesh_state::{InterfaceRecord, Peer, PersistedState, StateStore};

use crate::audit::{AuditPage, AuditRing};
use crate::error::{ProvisionError, Result};
use crate::ops::{
    peer_spec, ApplyRequest, ApplyResponse, OpSummary, PeerOperation, ReconcileMode,
    ReconcileRequest, ReconcileResult, RuntimeOp, ToggleRequest,
};
use crate::views::{mask_key, InterfaceDetails, InterfaceSummary, PeerView};

/// A pending audit line, recorded only once the batch lands.
type AuditNote = (&'static str, serde_json::Value);

/// A full-replace deployment of one interface.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Interface name.
    pub interface_name: String,
    /// Interface address in CIDR notation.
    pub address_cidr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Base64 private key, when managed here.
    pub private_key: Option<String>,
    /// The complete new peer set (already tagged with the interface).
    pub peers: Vec<Peer>,
}

/// Acknowledgement of a deployment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Interface name.
    pub interface: String,
    /// New revision.
    pub revision: u64,
    /// Peers now managed on the interface.
    pub peer_count: usize,
}

/// Orchestrates the state store and the runtime adapter.
///
/// Runtime operations always execute OUTSIDE the store's update closure;
/// the closure is entered only to persist an already-successful result.
pub struct ProvisionService<R> {
    store: StateStore,
    runtime: R,
    audit: Arc<AuditRing>,
}

impl<R: RuntimeAdapter> ProvisionService<R> {
    /// Creates a service over explicit dependencies.
    pub fn new(store: StateStore, runtime: R) -> Self {
        Self {
            store,
            runtime,
            audit: Arc::new(AuditRing::new()),
        }
    }

    /// The audit ring, shareable with other readers.
    #[must_use]
    pub fn audit_ring(&self) -> Arc<AuditRing> {
        Arc::clone(&self.audit)
    }

    /// The runtime adapter.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Union of persisted, runtime, and peer-referenced interfaces.
    ///
    /// # Errors
    ///
    /// Returns state or runtime errors.
    pub async fn list_interfaces(&self) -> Result<Vec<InterfaceSummary>> {
        let state = self.store.load()?;
        let runtime_names = self.runtime.list_interfaces().await?;

        let mut names: BTreeSet<String> = state.referenced_interfaces().into_iter().collect();
        names.extend(runtime_names.iter().cloned());

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let managed_count = state.interface_peers(&name).count();
            let summary = if let Some(record) = state.interfaces.get(&name) {
                InterfaceSummary {
                    name,
                    is_up: record.is_up,
                    listen_port: record.listen_port,
                    peer_count: managed_count,
                    last_sync_at: Some(state.updated_at),
                }
            } else if managed_count > 0 {
                // Referenced by peers but never persisted as a record.
                InterfaceSummary {
                    is_up: runtime_names.contains(&name),
                    listen_port: 0,
                    peer_count: managed_count,
                    last_sync_at: Some(state.updated_at),
                    name,
                }
            } else {
                let live = self
                    .runtime
                    .interface(&name)
                    .await?
                    .map_or(0, |i| i.peers.len());
                InterfaceSummary {
                    name,
                    is_up: true,
                    listen_port: 0,
                    peer_count: live,
                    last_sync_at: None,
                }
            };
            out.push(summary);
        }
        Ok(out)
    }

    /// Merged persisted + runtime view of one interface.
    ///
    /// # Errors
    ///
    /// Returns `InterfaceNotFound` when the interface exists nowhere.
    pub async fn interface_details(&self, name: &str) -> Result<InterfaceDetails> {
        let state = self.store.load()?;
        let record = state.interfaces.get(name).cloned();
        let runtime = self.runtime.interface(name).await?;
        let managed: Vec<&Peer> = state.interface_peers(name).collect();

        if record.is_none() && runtime.is_none() && managed.is_empty() {
            return Err(ProvisionError::InterfaceNotFound(name.to_string()));
        }

        let persisted = record.is_some();
        let record = record.unwrap_or_else(InterfaceRecord::synthetic);
        let runtime = runtime.unwrap_or_default();

        let by_key: HashMap<&str, &wgmesh_runtime::RuntimePeer> = runtime
            .peers
            .iter()
            .map(|p| (p.public_key.as_str(), p))
            .collect();

        let mut peers: Vec<PeerView> = managed
            .iter()
            .map(|p| PeerView::managed(p, by_key.get(p.public_key.as_str()).copied()))
            .collect();
        for runtime_peer in &runtime.peers {
            if !managed.iter().any(|p| p.public_key == runtime_peer.public_key) {
                peers.push(PeerView::discovered(runtime_peer));
            }
        }

        let private_key = record
            .private_key
            .as_deref()
            .or(runtime.private_key.as_deref())
            .map(mask_key);

        Ok(InterfaceDetails {
            name: name.to_string(),
            is_up: if persisted { record.is_up } else { true },
            listen_port: if record.listen_port > 0 {
                record.listen_port
            } else {
                runtime.listen_port
            },
            address_cidr: record.address_cidr,
            revision: record.revision,
            private_key,
            public_key: runtime.public_key,
            peers,
            last_sync_at: persisted.then_some(state.updated_at),
        })
    }

    /// Applies an ordered batch of peer operations, or plans it.
    ///
    /// # Errors
    ///
    /// Returns `RevisionConflict`, `InterfaceNotFound`, or `ApplyFailed`
    /// after compensation.
    pub async fn apply_peer_operations(
        &self,
        name: &str,
        request: ApplyRequest,
    ) -> Result<ApplyResponse> {
        let state = self.store.load()?;
        let record = self.resolve_record(&state, name).await?;
        check_revision(&record, request.revision)?;

        let mut peers: Vec<Peer> = state.interface_peers(name).cloned().collect();
        let mut runtime_ops = Vec::new();
        let mut summary = OpSummary::default();
        let mut notes: Vec<AuditNote> = Vec::new();

        for operation in request.operations {
            match operation {
                PeerOperation::Add { peer } => {
                    let peer = peer.into_peer(name);
                    if peer.allowed_ips.is_empty() {
                        return Err(ProvisionError::Validation(format!(
                            "peer {} has no allowed IPs",
                            peer.name
                        )));
                    }
                    if peer.is_active {
                        runtime_ops.push(RuntimeOp::Add {
                            peer: peer_spec(&peer),
                        });
                    }
                    notes.push((
                        "peer.add",
                        json!({"peerId": peer.peer_id, "publicKey": peer.public_key}),
                    ));
                    peers.push(peer);
                    summary.added += 1;
                }
                PeerOperation::Update { peer_id, patch } => {
                    // Missing targets are silently skipped.
                    let Some(peer) = peers.iter_mut().find(|p| p.peer_id == peer_id) else {
                        continue;
                    };
                    let previous = peer_spec(peer);
                    patch.apply_to(peer);
                    if peer.is_active {
                        runtime_ops.push(RuntimeOp::Update {
                            next: peer_spec(peer),
                            previous,
                        });
                    }
                    notes.push(("peer.update", json!({ "peerId": peer_id })));
                    summary.updated += 1;
                }
                PeerOperation::Toggle { peer_id, is_active } => {
                    let Some(peer) = peers.iter_mut().find(|p| p.peer_id == peer_id) else {
                        continue;
                    };
                    peer.is_active = is_active;
                    let spec = peer_spec(peer);
                    if is_active {
                        runtime_ops.push(RuntimeOp::Add { peer: spec });
                    } else {
                        runtime_ops.push(RuntimeOp::Remove { peer: spec });
                    }
                    notes.push((
                        "peer.toggle",
                        json!({"peerId": peer_id, "isActive": is_active}),
                    ));
                    summary.toggled += 1;
                }
                PeerOperation::Remove { peer_id } => {
                    let Some(index) = peers.iter().position(|p| p.peer_id == peer_id) else {
                        continue;
                    };
                    let peer = peers.remove(index);
                    runtime_ops.push(RuntimeOp::Remove {
                        peer: peer_spec(&peer),
                    });
                    notes.push((
                        "peer.remove",
                        json!({"peerId": peer_id, "publicKey": peer.public_key}),
                    ));
                    summary.removed += 1;
                }
            }
        }

        if request.dry_run {
            let plan = runtime_ops.iter().map(|op| op.plan_line(name)).collect();
            return Ok(ApplyResponse::DryRun {
                dry_run: true,
                current_revision: record.revision,
                next_revision: record.revision + 1,
                plan,
                summary,
            });
        }

        self.execute_with_rollback(name, &runtime_ops).await?;

        let expected = request.revision;
        let revision = self.store.update(move |state| {
            let record = state
                .interfaces
                .entry(name.to_string())
                .or_insert_with(|| {
                    // Synthetic upgrade: first persisted touch of a
                    // runtime-discovered interface.
                    record.clone()
                });
            check_revision(record, expected)?;
            record.revision += 1;
            let revision = record.revision;
            state.peers.retain(|p| !p.belongs_to(name));
            state.peers.extend(peers);
            state.updated_at = Utc::now();
            Ok::<_, ProvisionError>(revision)
        })?;

        for (action, detail) in notes {
            self.audit.record(name, action, detail);
        }
        info!(interface = %name, revision, ?summary, "applied peer operations");

        Ok(ApplyResponse::Applied {
            applied: true,
            revision,
            summary,
        })
    }

    /// Brings the link up or down, keeping state and runtime in step.
    ///
    /// # Errors
    ///
    /// Returns `RevisionConflict`, `InterfaceNotFound`, or runtime/state
    /// failures. A state failure after the runtime toggled triggers a
    /// best-effort toggle back.
    pub async fn toggle_interface(
        &self,
        name: &str,
        request: ToggleRequest,
    ) -> Result<InterfaceDetails> {
        let state = self.store.load()?;
        let record = self.resolve_record(&state, name).await?;
        check_revision(&record, request.revision)?;

        if request.dry_run {
            return self.interface_details(name).await;
        }

        let was_up = record.is_up;
        self.runtime.toggle_interface(name, request.is_up).await?;

        let expected = request.revision;
        let is_up = request.is_up;
        let outcome = self.store.update(move |state| {
            let entry = state
                .interfaces
                .entry(name.to_string())
                .or_insert_with(|| record.clone());
            check_revision(entry, expected)?;
            entry.is_up = is_up;
            entry.revision += 1;
            let revision = entry.revision;
            state.updated_at = Utc::now();
            Ok::<_, ProvisionError>(revision)
        });

        match outcome {
            Ok(revision) => {
                self.audit.record(
                    name,
                    "interface.toggle",
                    json!({"isUp": request.is_up, "revision": revision}),
                );
                self.interface_details(name).await
            }
            Err(err) => {
                // State persist failed after the runtime changed; put the
                // link back and surface the original error.
                if let Err(rollback_err) = self.runtime.toggle_interface(name, was_up).await {
                    warn!(
                        interface = %name,
                        error = %rollback_err,
                        "toggle rollback failed, runtime is ahead of state"
                    );
                }
                Err(err)
            }
        }
    }

    /// Detects drift and repairs it in the requested direction.
    ///
    /// # Errors
    ///
    /// Returns `RevisionConflict`, `InterfaceNotFound`, or `ApplyFailed`
    /// after compensation (`state_to_runtime` only).
    pub async fn reconcile(
        &self,
        name: &str,
        request: ReconcileRequest,
    ) -> Result<ReconcileResult> {
        let state = self.store.load()?;
        let record = self.resolve_record(&state, name).await?;
        check_revision(&record, request.revision)?;

        let runtime = self
            .runtime
            .interface(name)
            .await?
            .unwrap_or_else(RuntimeInterface::default);
        let runtime_keys: BTreeSet<&str> =
            runtime.peers.iter().map(|p| p.public_key.as_str()).collect();
        let state_keys: BTreeSet<&str> = state
            .interface_peers(name)
            .map(|p| p.public_key.as_str())
            .collect();

        let missing: Vec<Peer> = state
            .interface_peers(name)
            .filter(|p| p.is_active && !runtime_keys.contains(p.public_key.as_str()))
            .cloned()
            .collect();
        let zombies: Vec<wgmesh_runtime::RuntimePeer> = runtime
            .peers
            .iter()
            .filter(|p| !state_keys.contains(p.public_key.as_str()))
            .cloned()
            .collect();

        let drift_found = !missing.is_empty() || !zombies.is_empty();
        let missing_keys: Vec<String> = missing.iter().map(|p| p.public_key.clone()).collect();
        let zombie_keys: Vec<String> = zombies.iter().map(|p| p.public_key.clone()).collect();
        debug!(
            interface = %name,
            missing = missing_keys.len(),
            zombies = zombie_keys.len(),
            "computed drift"
        );

        let expected = request.revision;
        let revision = match request.mode {
            ReconcileMode::StateToRuntime => {
                let mut runtime_ops = Vec::with_capacity(missing.len() + zombies.len());
                for peer in &missing {
                    runtime_ops.push(RuntimeOp::Add {
                        peer: peer_spec(peer),
                    });
                }
                for zombie in &zombies {
                    runtime_ops.push(RuntimeOp::Remove {
                        peer: wgmesh_runtime::PeerSpec {
                            public_key: zombie.public_key.clone(),
                            preshared_key: None,
                            allowed_ips: zombie.allowed_ips.clone(),
                            endpoint: zombie.endpoint.clone(),
                            persistent_keepalive: zombie.persistent_keepalive,
                        },
                    });
                }

                self.execute_with_rollback(name, &runtime_ops).await?;

                if drift_found {
                    self.store.update(move |state| {
                        let entry = state
                            .interfaces
                            .entry(name.to_string())
                            .or_insert_with(|| record.clone());
                        check_revision(entry, expected)?;
                        entry.revision += 1;
                        let revision = entry.revision;
                        state.updated_at = Utc::now();
                        Ok::<_, ProvisionError>(revision)
                    })?
                } else {
                    record.revision
                }
            }
            ReconcileMode::RuntimeToState => {
                let runtime_key_owned: BTreeSet<String> =
                    runtime_keys.iter().map(|k| (*k).to_string()).collect();
                let zombies = zombies.clone();
                self.store.update(move |state| {
                    let mut changed = false;
                    for peer in state.peers.iter_mut().filter(|p| p.belongs_to(name)) {
                        if peer.is_active && !runtime_key_owned.contains(&peer.public_key) {
                            peer.is_active = false;
                            changed = true;
                        }
                    }
                    for zombie in &zombies {
                        state.peers.push(Peer {
                            peer_id: Uuid::new_v4().to_string(),
                            name: format!(
                                "runtime-{}",
                                &zombie.public_key[..8.min(zombie.public_key.len())]
                            ),
                            public_key: zombie.public_key.clone(),
                            private_key: None,
                            allowed_ips: zombie.allowed_ips.clone(),
                            endpoint: zombie.endpoint.clone(),
                            persistent_keepalive: zombie.persistent_keepalive,
                            is_active: true,
                            interface: name.to_string(),
                        });
                        changed = true;
                    }

                    let entry = state
                        .interfaces
                        .entry(name.to_string())
                        .or_insert_with(|| record.clone());
                    check_revision(entry, expected)?;
                    if changed {
                        entry.revision += 1;
                    }
                    let revision = entry.revision;
                    if changed {
                        state.updated_at = Utc::now();
                    }

                    Ok::<_, ProvisionError>(revision)
                })?
            }
        };

        self.audit.record(
            name,
            "interface.reconcile",
            json!({
                "mode": request.mode,
                "driftFound": drift_found,
                "missing": missing_keys,
                "zombies": zombie_keys,
            }),
        );

        Ok(ReconcileResult {
            mode: request.mode,
            drift_found,
            missing_in_runtime: missing_keys,
            zombies: zombie_keys,
            revision,
        })
    }

    /// Full single-interface replacement from a resolved mesh.
    ///
    /// Persists the record and peer set first, then brings the link up,
    /// purges every runtime peer, and adds the new set.
    ///
    /// # Errors
    ///
    /// Returns state or runtime failures; a runtime failure here leaves the
    /// persisted intent in place for a later `reconcile(state_to_runtime)`.
    pub async fn deploy(&self, deployment: Deployment) -> Result<DeployResult> {
        let name = deployment.interface_name.clone();
        let peer_count = deployment.peers.len();

        let record_private_key = deployment.private_key.clone();
        let deploy_peers = deployment.peers.clone();
        let address_cidr = deployment.address_cidr.clone();
        let listen_port = deployment.listen_port;
        let iface = name.clone();
        let revision = self.store.update(move |state| {
            let entry = state
                .interfaces
                .entry(iface.clone())
                .or_insert_with(InterfaceRecord::synthetic);
            entry.listen_port = listen_port;
            entry.address_cidr = address_cidr;
            entry.private_key = record_private_key;
            entry.is_up = true;
            entry.revision += 1;
            let revision = entry.revision;
            state.peers.retain(|p| !p.belongs_to(&iface));
            state.peers.extend(deploy_peers);
            state.updated_at = Utc::now();
            Ok::<_, ProvisionError>(revision)
        })?;

        self.runtime
            .up_interface(
                &name,
                &InterfaceProvision {
                    private_key: deployment.private_key.clone(),
                    listen_port: deployment.listen_port,
                    address: Some(deployment.address_cidr.clone()),
                },
            )
            .await?;

        // Wholesale replace: every existing runtime peer goes, managed or
        // not.
        if let Some(existing) = self.runtime.interface(&name).await? {
            if !existing.peers.is_empty() {
                warn!(
                    interface = %name,
                    count = existing.peers.len(),
                    "deploy purging existing runtime peers"
                );
            }
            for peer in existing.peers {
                self.runtime
                    .remove_peer(&name, &peer.public_key, true)
                    .await?;
            }
        }

        for peer in &deployment.peers {
            if peer.is_active {
                self.runtime.add_peer(&name, &peer_spec(peer)).await?;
            }
        }

        self.audit.record(
            &name,
            "interface.deploy",
            json!({"revision": revision, "peerCount": peer_count}),
        );
        info!(interface = %name, revision, peers = peer_count, "deployed mesh config");

        Ok(DeployResult {
            interface: name,
            revision,
            peer_count,
        })
    }

    /// Reads a page of the audit ring.
    #[must_use]
    pub fn audit_page(&self, name: &str, limit: usize, cursor: Option<u64>) -> AuditPage {
        self.audit.page(name, limit, cursor)
    }

    /// Finds the interface record, upgrading a runtime-only interface to a
    /// synthetic record, or failing with `InterfaceNotFound`.
    async fn resolve_record(
        &self,
        state: &PersistedState,
        name: &str,
    ) -> Result<InterfaceRecord> {
        if let Some(record) = state.interfaces.get(name) {
            return Ok(record.clone());
        }
        if self.runtime.interface(name).await?.is_some() {
            return Ok(InterfaceRecord::synthetic());
        }
        // Peers referencing the interface keep it addressable even without
        // a record or a live link.
        if state.interface_peers(name).next().is_some() {
            return Ok(InterfaceRecord::synthetic());
        }
        Err(ProvisionError::InterfaceNotFound(name.to_string()))
    }

    /// Executes runtime ops in order; on the first failure, compensates the
    /// completed prefix in reverse and reports `ApplyFailed`.
    async fn execute_with_rollback(&self, name: &str, ops: &[RuntimeOp]) -> Result<()> {
        let mut completed: Vec<&RuntimeOp> = Vec::with_capacity(ops.len());
        for op in ops {
            let outcome = match op {
                RuntimeOp::Add { peer } => self.runtime.add_peer(name, peer).await,
                RuntimeOp::Remove { peer } => {
                    self.runtime.remove_peer(name, &peer.public_key, true).await
                }
                RuntimeOp::Update { next, .. } => self.runtime.update_peer(name, next).await,
            };
            match outcome {
                Ok(()) => completed.push(op),
                Err(err) => {
                    warn!(
                        interface = %name,
                        error = %err,
                        completed = completed.len(),
                        "runtime op failed, rolling back"
                    );
                    self.rollback(name, &completed).await;
                    return Err(ProvisionError::ApplyFailed(err.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Applies compensations LIFO. Individual failures are logged and never
    /// interrupt the remaining rollback.
    async fn rollback(&self, name: &str, completed: &[&RuntimeOp]) {
        for op in completed.iter().rev() {
            let compensation = op.compensation();
            let outcome = match &compensation {
                RuntimeOp::Add { peer } => self.runtime.add_peer(name, peer).await,
                RuntimeOp::Remove { peer } => {
                    self.runtime.remove_peer(name, &peer.public_key, true).await
                }
                RuntimeOp::Update { next, .. } => self.runtime.update_peer(name, next).await,
            };
            if let Err(err) = outcome {
                warn!(
                    interface = %name,
                    error = %err,
                    op = %compensation.plan_line(name),
                    "rollback op failed"
                );
            }
        }
    }
}

fn check_revision(record: &InterfaceRecord, received: u64) -> Result<()> {
    if record.revision != received {
        return Err(ProvisionError::RevisionConflict {
            expected: record.revision,
            received,
        });
    }
    Ok(())
}
