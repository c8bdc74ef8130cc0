//! The persisted document schema.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// Current schema version.
pub const STATE_VERSION: u32 = 1;

/// Interface a peer with an empty `interface` field belongs to.
pub const DEFAULT_INTERFACE: &str = "wg0";

/// A managed interface as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InterfaceRecord {
    /// Configured listen port (0 = unknown).
    pub listen_port: u16,
    /// Interface address in CIDR notation.
    pub address_cidr: String,
    /// Monotonic revision, the optimistic-concurrency token.
    pub revision: u64,
    /// Whether the link is meant to be up.
    pub is_up: bool,
    /// Base64 private key, when managed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl InterfaceRecord {
    /// The stand-in record for an interface that exists at runtime but has
    /// never been persisted.
    #[must_use]
    pub fn synthetic() -> Self {
        Self {
            listen_port: 0,
            address_cidr: "unknown/24".to_string(),
            revision: 0,
            is_up: true,
            private_key: None,
        }
    }
}

/// A managed peer as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Peer {
    /// UUID identifying this peer across edits.
    pub peer_id: String,
    /// Display name.
    pub name: String,
    /// Base64 public key.
    pub public_key: String,
    /// Base64 private key, when managed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Allowed IPs in CIDR notation (at least one).
    pub allowed_ips: Vec<String>,
    /// `host:port` endpoint, when the peer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Keepalive seconds, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
    /// Whether the peer should exist at runtime.
    pub is_active: bool,
    /// Owning interface; empty means [`DEFAULT_INTERFACE`].
    #[serde(default)]
    pub interface: String,
}

impl Peer {
    /// The owning interface name, applying the empty → "wg0" rule.
    #[must_use]
    pub fn interface_name(&self) -> &str {
        if self.interface.is_empty() {
            DEFAULT_INTERFACE
        } else {
            &self.interface
        }
    }

    /// Whether this peer belongs to the named interface.
    #[must_use]
    pub fn belongs_to(&self, name: &str) -> bool {
        self.interface_name() == name
    }
}

/// The whole on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersistedState {
    /// Schema version; always [`STATE_VERSION`].
    pub version: u32,
    /// Refreshed on every successful mutation.
    pub updated_at: DateTime<Utc>,
    /// Managed interfaces by name.
    pub interfaces: BTreeMap<String, InterfaceRecord>,
    /// Managed peers across all interfaces.
    pub peers: Vec<Peer>,
}

impl PersistedState {
    /// A fresh empty document.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            interfaces: BTreeMap::new(),
            peers: Vec::new(),
        }
    }

    /// Checks document-level invariants beyond the serde shape.
    ///
    /// # Errors
    ///
    /// Returns `CorruptState` on a version mismatch or a peer without
    /// allowed IPs.
    pub fn validate(&self) -> Result<()> {
        if self.version != STATE_VERSION {
            return Err(StateError::CorruptState(format!(
                "unsupported version {}",
                self.version
            )));
        }
        for peer in &self.peers {
            if peer.allowed_ips.is_empty() {
                return Err(StateError::CorruptState(format!(
                    "peer {} has no allowed IPs",
                    peer.peer_id
                )));
            }
        }
        Ok(())
    }

    /// Peers belonging to the named interface.
    pub fn interface_peers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Peer> {
        self.peers.iter().filter(move |p| p.belongs_to(name))
    }

    /// Every interface name referenced by a record or a peer.
    #[must_use]
    pub fn referenced_interfaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.interfaces.keys().cloned().collect();
        for peer in &self.peers {
            let name = peer.interface_name();
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str, interface: &str) -> Peer {
        Peer {
            peer_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            public_key: format!("{name}-pub"),
            private_key: None,
            allowed_ips: vec!["10.0.0.2/32".to_string()],
            endpoint: None,
            persistent_keepalive: None,
            is_active: true,
            interface: interface.to_string(),
        }
    }

    #[test]
    fn empty_interface_defaults_to_wg0() {
        let p = peer("p1", "");
        assert_eq!(p.interface_name(), "wg0");
        assert!(p.belongs_to("wg0"));
        assert!(!p.belongs_to("wg1"));
    }

    #[test]
    fn referenced_interfaces_unions_records_and_peers() {
        let mut state = PersistedState::empty();
        state
            .interfaces
            .insert("wg1".to_string(), InterfaceRecord::synthetic());
        state.peers.push(peer("p1", ""));
        state.peers.push(peer("p2", "wg2"));

        let mut names = state.referenced_interfaces();
        names.sort();
        assert_eq!(names, vec!["wg0", "wg1", "wg2"]);
    }

    #[test]
    fn unknown_fields_rejected() {
        let json = r#"{"version":1,"updatedAt":"2026-01-01T00:00:00Z","interfaces":{},"peers":[],"surprise":true}"#;
        assert!(serde_json::from_str::<PersistedState>(json).is_err());
    }

    #[test]
    fn version_mismatch_rejected() {
        let mut state = PersistedState::empty();
        state.version = 7;
        assert!(matches!(
            state.validate(),
            Err(StateError::CorruptState(_))
        ));
    }

    #[test]
    fn peer_without_allowed_ips_rejected() {
        let mut state = PersistedState::empty();
        let mut p = peer("p1", "wg0");
        p.allowed_ips.clear();
        state.peers.push(p);
        assert!(state.validate().is_err());
    }

    #[test]
    fn synthetic_record_shape() {
        let record = InterfaceRecord::synthetic();
        assert_eq!(record.listen_port, 0);
        assert_eq!(record.address_cidr, "unknown/24");
        assert_eq!(record.revision, 0);
        assert!(record.is_up);
    }
}
