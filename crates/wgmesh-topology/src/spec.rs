//! Declarative mesh description and boundary validation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use wgmesh_wire::{CidrPlan, PrivateKey, PublicKey};

use crate::error::{Result, TopologyError};

/// Maximum interface name length accepted by the kernel.
pub const MAX_INTERFACE_NAME: usize = 32;

/// Cap on nodes and clients per spec, each.
pub const MAX_PEERS: usize = 1000;

/// Address family used when rendering peer endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndpointVersion {
    /// `host:port`
    #[default]
    Ipv4,
    /// `[host]:port`
    Ipv6,
}

impl fmt::Display for EndpointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "ipv4"),
            Self::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Which preshared-key strategy a synthesis run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PskMode {
    /// Deterministic derivation from the sorted peer-name pair.
    #[default]
    Derived,
    /// Fresh CSPRNG key per pair.
    Random,
}

/// A long-lived mesh node with a public endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    /// Stable identifier.
    pub id: String,
    /// Unique display name.
    pub name: String,
    /// Base64 private key, if pre-supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Base64 public key, if pre-supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Endpoint host (no port).
    pub endpoint: String,
    /// WireGuard listen port.
    pub listen_port: u16,
    /// Optional SSH user for deployment tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
    /// Optional SSH port for deployment tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
}

/// A client peer connecting only to gateway nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInput {
    /// Stable identifier.
    pub id: String,
    /// Unique display name.
    pub name: String,
    /// Base64 private key, if pre-supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Base64 public key, if pre-supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Declarative description of a mesh network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// IPv4 network in CIDR notation, prefix in `[8, 30]`.
    pub network_cidr: String,
    /// WireGuard interface name used on every peer.
    pub interface_name: String,
    /// Endpoint rendering family.
    #[serde(default)]
    pub endpoint_version: EndpointVersion,
    /// PersistentKeepalive seconds (0 disables).
    #[serde(default = "default_keepalive")]
    pub persistent_keepalive: u16,
    /// Emit sysctl PostUp/PostDown for IP forwarding on nodes.
    #[serde(default)]
    pub include_ip_forwarding: bool,
    /// Emit a babeld fragment per node.
    #[serde(default)]
    pub enable_babel: bool,
    /// Generate keypairs for peers that supplied none.
    #[serde(default = "default_true")]
    pub auto_generate_keys: bool,
    /// Ordered node list.
    #[serde(default)]
    pub nodes: Vec<NodeInput>,
    /// Ordered client list.
    #[serde(default)]
    pub clients: Vec<ClientInput>,
    /// Names of nodes accepting client traffic.
    #[serde(default)]
    pub gateway_node_names: Vec<String>,
    /// Preshared-key strategy for this synthesis.
    #[serde(default)]
    pub psk_mode: PskMode,
}

fn default_keepalive() -> u16 {
    25
}

fn default_true() -> bool {
    true
}

impl MeshSpec {
    /// Validates the spec's shape invariants and returns the parsed plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCidr`, `CapacityExceeded`, `UnknownGateway`, or
    /// `Validation` per the failed invariant. Key material is checked for
    /// well-formedness here; presence rules are the resolver's job.
    pub fn validate(&self) -> Result<CidrPlan> {
        let plan = CidrPlan::parse(&self.network_cidr)
            .map_err(|e| TopologyError::InvalidCidr(e.to_string()))?;

        validate_interface_name(&self.interface_name)?;

        if self.nodes.len() > MAX_PEERS {
            return Err(TopologyError::Validation(format!(
                "too many nodes: {} (cap {MAX_PEERS})",
                self.nodes.len()
            )));
        }
        if self.clients.len() > MAX_PEERS {
            return Err(TopologyError::Validation(format!(
                "too many clients: {} (cap {MAX_PEERS})",
                self.clients.len()
            )));
        }

        let mut node_names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(TopologyError::Validation("empty node name".to_string()));
            }
            if !node_names.insert(node.name.as_str()) {
                return Err(TopologyError::Validation(format!(
                    "duplicate node name: {}",
                    node.name
                )));
            }
            check_key_shape(&node.name, node.private_key.as_deref(), true)?;
            check_key_shape(&node.name, node.public_key.as_deref(), false)?;
        }

        let mut client_names = HashSet::new();
        for client in &self.clients {
            if client.name.trim().is_empty() {
                return Err(TopologyError::Validation("empty client name".to_string()));
            }
            if !client_names.insert(client.name.as_str()) {
                return Err(TopologyError::Validation(format!(
                    "duplicate client name: {}",
                    client.name
                )));
            }
            check_key_shape(&client.name, client.private_key.as_deref(), true)?;
            check_key_shape(&client.name, client.public_key.as_deref(), false)?;
        }

        for gateway in &self.gateway_node_names {
            if !node_names.contains(gateway.as_str()) {
                return Err(TopologyError::UnknownGateway(gateway.clone()));
            }
        }

        // Capacity: base+1+|nodes| and base+101+|clients| must stay inside
        // the network.
        let last = u64::from(plan.last());
        let base = u64::from(plan.base());
        if base + 1 + self.nodes.len() as u64 > last {
            return Err(TopologyError::CapacityExceeded {
                cidr: self.network_cidr.clone(),
                role: "node",
                index: self.nodes.len().saturating_sub(1),
            });
        }
        if !self.clients.is_empty() && base + 101 + self.clients.len() as u64 > last {
            return Err(TopologyError::CapacityExceeded {
                cidr: self.network_cidr.clone(),
                role: "client",
                index: self.clients.len() - 1,
            });
        }

        Ok(plan)
    }

    /// Whether the named node is in the gateway set.
    #[must_use]
    pub fn is_gateway(&self, node_name: &str) -> bool {
        self.gateway_node_names.iter().any(|g| g == node_name)
    }
}

fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TopologyError::Validation(
            "interface name is empty".to_string(),
        ));
    }
    if name.len() > MAX_INTERFACE_NAME {
        return Err(TopologyError::Validation(format!(
            "interface name longer than {MAX_INTERFACE_NAME} chars: {name}"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(TopologyError::Validation(format!(
            "interface name contains {bad:?}"
        )));
    }
    Ok(())
}

fn check_key_shape(peer: &str, key: Option<&str>, private: bool) -> Result<()> {
    let Some(key) = key else { return Ok(()) };
    let outcome = if private {
        PrivateKey::from_base64(key).map(|_| ())
    } else {
        PublicKey::from_base64(key).map(|_| ())
    };
    outcome.map_err(|e| TopologyError::InvalidKey {
        peer: peer.to_string(),
        reason: e.to_string(),
    })
}
