//! Read-model shapes returned by the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wgmesh_runtime::RuntimePeer;
use wgmesh_state::Peer;

/// One row of `listInterfaces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSummary {
    /// Interface name.
    pub name: String,
    /// Whether the link is (meant to be) up.
    pub is_up: bool,
    /// Listen port (0 = unknown).
    pub listen_port: u16,
    /// Managed peer count, or live count for runtime-only interfaces.
    pub peer_count: usize,
    /// Last successful state mutation, when the interface is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// A peer in the merged interface view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    /// Managed peer id, or `discovered_…` for unmanaged peers.
    pub peer_id: String,
    /// Display name.
    pub name: String,
    /// Base64 public key.
    pub public_key: String,
    /// Allowed IPs.
    pub allowed_ips: Vec<String>,
    /// Endpoint, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Keepalive, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
    /// Whether the peer should exist at runtime.
    pub is_active: bool,
    /// Present at runtime without a managed counterpart.
    pub is_unmanaged: bool,
    /// Unix seconds of the last handshake (0 = never).
    pub latest_handshake: u64,
    /// Bytes received.
    pub transfer_rx: u64,
    /// Bytes transmitted.
    pub transfer_tx: u64,
}

impl PeerView {
    /// A managed peer joined with its runtime counters, zeros when absent.
    #[must_use]
    pub fn managed(peer: &Peer, runtime: Option<&RuntimePeer>) -> Self {
        Self {
            peer_id: peer.peer_id.clone(),
            name: peer.name.clone(),
            public_key: peer.public_key.clone(),
            allowed_ips: peer.allowed_ips.clone(),
            endpoint: peer.endpoint.clone(),
            persistent_keepalive: peer.persistent_keepalive,
            is_active: peer.is_active,
            is_unmanaged: false,
            latest_handshake: runtime.map_or(0, |r| r.latest_handshake),
            transfer_rx: runtime.map_or(0, |r| r.transfer_rx),
            transfer_tx: runtime.map_or(0, |r| r.transfer_tx),
        }
    }

    /// A runtime peer nobody manages, synthesized for display.
    #[must_use]
    pub fn discovered(runtime: &RuntimePeer) -> Self {
        let key = &runtime.public_key;
        Self {
            peer_id: format!("discovered_{}", truncated(key, 12)),
            name: format!("discovered-{}", truncated(key, 8)),
            public_key: key.clone(),
            allowed_ips: runtime.allowed_ips.clone(),
            endpoint: runtime.endpoint.clone(),
            persistent_keepalive: runtime.persistent_keepalive,
            is_active: true,
            is_unmanaged: true,
            latest_handshake: runtime.latest_handshake,
            transfer_rx: runtime.transfer_rx,
            transfer_tx: runtime.transfer_tx,
        }
    }
}

/// The merged persisted + runtime view of one interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDetails {
    /// Interface name.
    pub name: String,
    /// Whether the link is (meant to be) up.
    pub is_up: bool,
    /// Listen port, preferring the persisted value.
    pub listen_port: u16,
    /// Interface address in CIDR notation.
    pub address_cidr: String,
    /// Current revision (0 for synthetic records).
    pub revision: u64,
    /// Masked private key, when one exists anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Interface public key, when the runtime reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Union of managed and discovered peers.
    pub peers: Vec<PeerView>,
    /// Last successful state mutation, when persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Masks key material to `prefix4 + "..." + suffix4`.
#[must_use]
pub fn mask_key(key: &str) -> String {
    if key.len() <= 8 {
        return "...".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

fn truncated(value: &str, len: usize) -> &str {
    &value[..len.min(value.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_peer(key: &str) -> RuntimePeer {
        RuntimePeer {
            public_key: key.to_string(),
            preshared_key: None,
            endpoint: Some("198.51.100.7:51820".to_string()),
            allowed_ips: vec!["10.0.0.9/32".to_string()],
            latest_handshake: 1_700_000_123,
            transfer_rx: 11,
            transfer_tx: 22,
            persistent_keepalive: Some(25),
        }
    }

    #[test]
    fn mask_key_keeps_only_edges() {
        assert_eq!(mask_key("AAAABBBBCCCCDDDD"), "AAAA...DDDD");
        assert_eq!(mask_key("short"), "...");
    }

    #[test]
    fn discovered_view_shape() {
        let view = PeerView::discovered(&runtime_peer("AbCdEfGhIjKlMnOp"));
        assert_eq!(view.peer_id, "discovered_AbCdEfGhIjKl");
        assert_eq!(view.name, "discovered-AbCdEfGh");
        assert!(view.is_unmanaged);
        assert!(view.is_active);
        assert_eq!(view.transfer_rx, 11);
    }

    #[test]
    fn managed_view_zeroes_missing_counters() {
        let peer = Peer {
            peer_id: "id".to_string(),
            name: "p".to_string(),
            public_key: "pk".to_string(),
            private_key: None,
            allowed_ips: vec!["10.0.0.2/32".to_string()],
            endpoint: None,
            persistent_keepalive: None,
            is_active: true,
            interface: "wg0".to_string(),
        };
        let view = PeerView::managed(&peer, None);
        assert_eq!(view.latest_handshake, 0);
        assert_eq!(view.transfer_rx, 0);
        assert!(!view.is_unmanaged);

        let with_counters = PeerView::managed(&peer, Some(&runtime_peer("pk")));
        assert_eq!(with_counters.transfer_tx, 22);
    }
}
