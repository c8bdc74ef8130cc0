//! In-memory runtime double for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::adapter::RuntimeAdapter;
use crate::error::{Result, RuntimeError};
use crate::types::{HostInfo, InterfaceProvision, PeerSpec, RuntimeInterface, RuntimePeer};

#[derive(Debug, Clone, Default)]
struct FakeInterfaceData {
    private_key: Option<String>,
    listen_port: u16,
    is_up: bool,
    peers: HashMap<String, RuntimePeer>,
}

/// A fake runtime with injectable failures.
///
/// Peer mutations can be armed to fail per public key so rollback paths are
/// exercisable; everything else mirrors a kernel that always cooperates.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    interfaces: Arc<RwLock<HashMap<String, FakeInterfaceData>>>,
    fail_add: Arc<RwLock<HashSet<String>>>,
    fail_remove: Arc<RwLock<HashSet<String>>>,
}

impl FakeRuntime {
    /// Creates an empty fake runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an interface with the given port, up, and no peers.
    pub async fn install_interface(&self, name: &str, listen_port: u16) {
        let mut interfaces = self.interfaces.write().await;
        interfaces.insert(
            name.to_string(),
            FakeInterfaceData {
                private_key: None,
                listen_port,
                is_up: true,
                peers: HashMap::new(),
            },
        );
    }

    /// Inserts or replaces an observed peer on an interface.
    pub async fn install_peer(&self, name: &str, peer: RuntimePeer) {
        let mut interfaces = self.interfaces.write().await;
        let iface = interfaces.entry(name.to_string()).or_default();
        iface.peers.insert(peer.public_key.clone(), peer);
    }

    /// Arms a failure for the next `add_peer`/`update_peer` of this key.
    pub async fn fail_add_for(&self, public_key: &str) {
        self.fail_add.write().await.insert(public_key.to_string());
    }

    /// Arms a failure for the next `remove_peer` of this key.
    pub async fn fail_remove_for(&self, public_key: &str) {
        self.fail_remove.write().await.insert(public_key.to_string());
    }

    /// Sorted public keys currently present on an interface.
    pub async fn peer_keys(&self, name: &str) -> Vec<String> {
        let interfaces = self.interfaces.read().await;
        let mut keys: Vec<String> = interfaces
            .get(name)
            .map(|i| i.peers.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Whether the named interface reports itself up.
    pub async fn is_up(&self, name: &str) -> bool {
        let interfaces = self.interfaces.read().await;
        interfaces.get(name).is_some_and(|i| i.is_up)
    }

    /// Sets observed counters and handshake time on a peer.
    pub async fn set_counters(&self, name: &str, public_key: &str, rx: u64, tx: u64, handshake: u64) {
        let mut interfaces = self.interfaces.write().await;
        if let Some(peer) = interfaces
            .get_mut(name)
            .and_then(|i| i.peers.get_mut(public_key))
        {
            peer.transfer_rx = rx;
            peer.transfer_tx = tx;
            peer.latest_handshake = handshake;
        }
    }
}

fn missing_device(name: &str) -> RuntimeError {
    RuntimeError::command(
        format!("wg show {name}"),
        Some(1),
        &format!("Unable to access interface {name}: No such device"),
    )
}

impl RuntimeAdapter for FakeRuntime {
    async fn list_interfaces(&self) -> Result<Vec<String>> {
        let interfaces = self.interfaces.read().await;
        let mut names: Vec<String> = interfaces.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn interface(&self, name: &str) -> Result<Option<RuntimeInterface>> {
        let interfaces = self.interfaces.read().await;
        Ok(interfaces.get(name).map(|data| RuntimeInterface {
            private_key: data.private_key.clone(),
            public_key: None,
            listen_port: data.listen_port,
            fwmark: None,
            mtu: None,
            dns: None,
            table: None,
            peers: data.peers.values().cloned().collect(),
        }))
    }

    async fn add_peer(&self, name: &str, peer: &PeerSpec) -> Result<()> {
        if self.fail_add.write().await.remove(&peer.public_key) {
            return Err(RuntimeError::command(
                format!("wg set {name} peer {}", peer.public_key),
                Some(1),
                "injected add failure",
            ));
        }
        let mut interfaces = self.interfaces.write().await;
        let iface = interfaces
            .get_mut(name)
            .ok_or_else(|| missing_device(name))?;
        iface.peers.insert(
            peer.public_key.clone(),
            RuntimePeer {
                public_key: peer.public_key.clone(),
                preshared_key: peer.preshared_key.clone(),
                endpoint: peer.endpoint.clone(),
                allowed_ips: peer.allowed_ips.clone(),
                latest_handshake: 0,
                transfer_rx: 0,
                transfer_tx: 0,
                persistent_keepalive: peer.persistent_keepalive,
            },
        );
        Ok(())
    }

    async fn remove_peer(&self, name: &str, public_key: &str, ignore_missing: bool) -> Result<()> {
        if self.fail_remove.write().await.remove(public_key) {
            return Err(RuntimeError::command(
                format!("wg set {name} peer {public_key} remove"),
                Some(1),
                "injected remove failure",
            ));
        }
        let mut interfaces = self.interfaces.write().await;
        let iface = interfaces
            .get_mut(name)
            .ok_or_else(|| missing_device(name))?;
        if iface.peers.remove(public_key).is_none() && !ignore_missing {
            return Err(RuntimeError::command(
                format!("wg set {name} peer {public_key} remove"),
                Some(1),
                &format!("peer not found: {public_key}"),
            ));
        }
        Ok(())
    }

    async fn update_peer(&self, name: &str, peer: &PeerSpec) -> Result<()> {
        self.add_peer(name, peer).await
    }

    async fn toggle_interface(&self, name: &str, up: bool) -> Result<()> {
        let mut interfaces = self.interfaces.write().await;
        let iface = interfaces
            .get_mut(name)
            .ok_or_else(|| missing_device(name))?;
        iface.is_up = up;
        Ok(())
    }

    async fn up_interface(&self, name: &str, provision: &InterfaceProvision) -> Result<()> {
        let mut interfaces = self.interfaces.write().await;
        let iface = interfaces.entry(name.to_string()).or_default();
        if let Some(private_key) = &provision.private_key {
            iface.private_key = Some(private_key.clone());
        }
        iface.listen_port = provision.listen_port;
        iface.is_up = true;
        Ok(())
    }

    async fn host_info(&self) -> HostInfo {
        HostInfo {
            hostname: "fake-host".to_string(),
            version: "wireguard-tools v1.0.0-fake".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(public_key: &str) -> PeerSpec {
        PeerSpec {
            public_key: public_key.to_string(),
            preshared_key: None,
            allowed_ips: vec!["10.0.0.2/32".to_string()],
            endpoint: None,
            persistent_keepalive: None,
        }
    }

    #[tokio::test]
    async fn add_and_remove_peer() {
        let fake = FakeRuntime::new();
        fake.install_interface("wg0", 51820).await;

        fake.add_peer("wg0", &spec("pk1")).await.expect("add");
        assert_eq!(fake.peer_keys("wg0").await, vec!["pk1"]);

        fake.remove_peer("wg0", "pk1", false).await.expect("remove");
        assert!(fake.peer_keys("wg0").await.is_empty());
    }

    #[tokio::test]
    async fn add_is_idempotent_upsert() {
        let fake = FakeRuntime::new();
        fake.install_interface("wg0", 51820).await;

        fake.add_peer("wg0", &spec("pk1")).await.expect("add");
        let mut updated = spec("pk1");
        updated.endpoint = Some("1.2.3.4:51820".to_string());
        fake.add_peer("wg0", &updated).await.expect("re-add");

        let iface = fake.interface("wg0").await.expect("get").expect("exists");
        assert_eq!(iface.peers.len(), 1);
        assert_eq!(iface.peers[0].endpoint.as_deref(), Some("1.2.3.4:51820"));
    }

    #[tokio::test]
    async fn missing_interface_maps_to_none() {
        let fake = FakeRuntime::new();
        assert!(fake.interface("wg9").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn missing_interface_errors_look_like_the_real_tool() {
        let fake = FakeRuntime::new();
        let err = fake.add_peer("wg9", &spec("pk1")).await.expect_err("no device");
        assert!(err.is_not_exists());
    }

    #[tokio::test]
    async fn remove_missing_peer_respects_ignore_flag() {
        let fake = FakeRuntime::new();
        fake.install_interface("wg0", 51820).await;

        assert!(fake.remove_peer("wg0", "ghost", false).await.is_err());
        assert!(fake.remove_peer("wg0", "ghost", true).await.is_ok());
    }

    #[tokio::test]
    async fn injected_add_failure_fires_once() {
        let fake = FakeRuntime::new();
        fake.install_interface("wg0", 51820).await;
        fake.fail_add_for("pk1").await;

        assert!(fake.add_peer("wg0", &spec("pk1")).await.is_err());
        assert!(fake.add_peer("wg0", &spec("pk1")).await.is_ok());
    }

    #[tokio::test]
    async fn toggle_tracks_state() {
        let fake = FakeRuntime::new();
        fake.install_interface("wg0", 51820).await;
        assert!(fake.is_up("wg0").await);

        fake.toggle_interface("wg0", false).await.expect("down");
        assert!(!fake.is_up("wg0").await);
    }

    #[tokio::test]
    async fn up_interface_creates_and_configures() {
        let fake = FakeRuntime::new();
        fake.up_interface(
            "wg1",
            &InterfaceProvision {
                private_key: Some("priv==".to_string()),
                listen_port: 51821,
                address: Some("10.0.0.1/32".to_string()),
            },
        )
        .await
        .expect("up");

        let iface = fake.interface("wg1").await.expect("get").expect("exists");
        assert_eq!(iface.listen_port, 51821);
        assert!(fake.is_up("wg1").await);
    }
}
