//! Observed and requested runtime shapes.

use serde::{Deserialize, Serialize};

/// A peer as observed on a live interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePeer {
    /// Base64 public key.
    pub public_key: String,
    /// Base64 preshared key, when one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,
    /// Current endpoint, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Allowed IPs in CIDR notation.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    /// Unix seconds of the last handshake (0 = never).
    #[serde(default)]
    pub latest_handshake: u64,
    /// Bytes received from this peer.
    #[serde(default)]
    pub transfer_rx: u64,
    /// Bytes transmitted to this peer.
    #[serde(default)]
    pub transfer_tx: u64,
    /// Keepalive seconds, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
}

/// Interface-level fields plus observed peers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInterface {
    /// Base64 private key, when readable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Base64 public key, when readable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Listen port (0 = unset).
    #[serde(default)]
    pub listen_port: u16,
    /// Firewall mark, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwmark: Option<u32>,
    /// MTU, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    /// DNS servers, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    /// Routing table, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Observed peers.
    #[serde(default)]
    pub peers: Vec<RuntimePeer>,
}

/// What to apply when adding or updating a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSpec {
    /// Base64 public key.
    pub public_key: String,
    /// Base64 preshared key; travels via a 0600 temp file, never argv.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,
    /// Allowed IPs in CIDR notation.
    pub allowed_ips: Vec<String>,
    /// `host:port` endpoint, when the peer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Keepalive seconds, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
}

/// What `up_interface` needs to bring a link online.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceProvision {
    /// Base64 private key; applied via a 0600 temp file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Listen port to configure.
    pub listen_port: u16,
    /// Address to assign in CIDR notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Best-effort host identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    /// Hostname, `"unknown"` when unreadable.
    pub hostname: String,
    /// Control-tool version string, `"unknown"` when unreadable.
    pub version: String,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            hostname: "unknown".to_string(),
            version: "unknown".to_string(),
        }
    }
}
