//! Deterministic mesh resolution: address plan, key fill, adjacency.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::debug;
use wgmesh_wire::{generate_keypair, CidrPlan, PrivateKey};

use crate::error::{Result, TopologyError};
use crate::spec::MeshSpec;

/// A node with its assigned address and filled keys.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    /// Stable identifier from the input.
    pub id: String,
    /// Unique name.
    pub name: String,
    /// Mesh-internal address (`base + 1 + index`).
    pub address: Ipv4Addr,
    /// Endpoint host (no port).
    pub endpoint: String,
    /// WireGuard listen port.
    pub listen_port: u16,
    /// Base64 private key.
    pub private_key: String,
    /// Base64 public key.
    pub public_key: String,
}

/// A client with its assigned address and filled keys.
#[derive(Debug, Clone)]
pub struct ResolvedClient {
    /// Stable identifier from the input.
    pub id: String,
    /// Unique name.
    pub name: String,
    /// Mesh-internal address (`base + 101 + index`).
    pub address: Ipv4Addr,
    /// Base64 private key.
    pub private_key: String,
    /// Base64 public key.
    pub public_key: String,
}

/// The fully resolved mesh.
#[derive(Debug, Clone)]
pub struct ResolvedMesh {
    /// The parsed network plan.
    pub plan: CidrPlan,
    /// Nodes in input order.
    pub nodes: Vec<ResolvedNode>,
    /// Clients in input order.
    pub clients: Vec<ResolvedClient>,
    /// Neighbor indices per node, parallel to `nodes`.
    pub neighbors: Vec<Vec<usize>>,
}

impl ResolvedMesh {
    /// Neighbor adjacency keyed by node name.
    #[must_use]
    pub fn neighbor_names(&self) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let peers = self.neighbors[i]
                    .iter()
                    .map(|&j| self.nodes[j].name.clone())
                    .collect();
                (node.name.clone(), peers)
            })
            .collect()
    }
}

/// Neighbor indices for node `i` of `n`.
///
/// Rings use offsets `{±1}` below six nodes and `{±1, ±3}` from six up;
/// two- and three-node meshes degenerate to "everyone else".
#[must_use]
pub fn neighbor_indices(i: usize, n: usize) -> Vec<usize> {
    if n <= 1 {
        return Vec::new();
    }
    let mut offsets = vec![1, n - 1];
    if n >= 6 {
        offsets.push(3);
        offsets.push(n - 3);
    }
    let mut out = Vec::new();
    for offset in offsets {
        let j = (i + offset) % n;
        if j != i && !out.contains(&j) {
            out.push(j);
        }
    }
    out
}

/// Resolves a validated spec into addresses, keys, and adjacency.
///
/// # Errors
///
/// Propagates validation failures plus `CapacityExceeded` and `MissingKey`.
pub fn resolve(spec: &MeshSpec) -> Result<ResolvedMesh> {
    let plan = spec.validate()?;

    let mut nodes = Vec::with_capacity(spec.nodes.len());
    for (i, input) in spec.nodes.iter().enumerate() {
        let address = plan
            .node_address(i as u32)
            .map_err(|_| TopologyError::CapacityExceeded {
                cidr: spec.network_cidr.clone(),
                role: "node",
                index: i,
            })?;
        let (private_key, public_key) = fill_keys(
            &input.name,
            input.private_key.as_deref(),
            input.public_key.as_deref(),
            spec.auto_generate_keys,
        )?;
        nodes.push(ResolvedNode {
            id: input.id.clone(),
            name: input.name.clone(),
            address,
            endpoint: input.endpoint.clone(),
            listen_port: input.listen_port,
            private_key,
            public_key,
        });
    }

    let mut clients = Vec::with_capacity(spec.clients.len());
    for (i, input) in spec.clients.iter().enumerate() {
        let address = plan
            .client_address(i as u32)
            .map_err(|_| TopologyError::CapacityExceeded {
                cidr: spec.network_cidr.clone(),
                role: "client",
                index: i,
            })?;
        let (private_key, public_key) = fill_keys(
            &input.name,
            input.private_key.as_deref(),
            input.public_key.as_deref(),
            spec.auto_generate_keys,
        )?;
        clients.push(ResolvedClient {
            id: input.id.clone(),
            name: input.name.clone(),
            address,
            private_key,
            public_key,
        });
    }

    let n = nodes.len();
    let neighbors = (0..n).map(|i| neighbor_indices(i, n)).collect();

    debug!(
        nodes = nodes.len(),
        clients = clients.len(),
        network = %spec.network_cidr,
        "resolved mesh"
    );

    Ok(ResolvedMesh {
        plan,
        nodes,
        clients,
        neighbors,
    })
}

fn fill_keys(
    name: &str,
    private: Option<&str>,
    public: Option<&str>,
    auto_generate: bool,
) -> Result<(String, String)> {
    match (private, public) {
        (Some(private), Some(public)) => Ok((private.to_string(), public.to_string())),
        (Some(private), None) => {
            let key = PrivateKey::from_base64(private).map_err(|e| TopologyError::InvalidKey {
                peer: name.to_string(),
                reason: e.to_string(),
            })?;
            Ok((private.to_string(), key.public_key().to_base64()))
        }
        (None, None) if auto_generate => {
            let (private, public) = generate_keypair();
            Ok((private.to_base64(), public.to_base64()))
        }
        _ => Err(TopologyError::MissingKey(name.to_string())),
    }
}
