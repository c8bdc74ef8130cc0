//! The runtime adapter contract.

use std::future::Future;

use crate::error::Result;
use crate::types::{HostInfo, InterfaceProvision, PeerSpec, RuntimeInterface};

/// Contract for reading and mutating live WireGuard interfaces.
///
/// Methods are declared as `impl Future + Send` so implementations can use
/// plain `async fn` while callers behind generic HTTP handlers still get
/// `Send` futures.
pub trait RuntimeAdapter: Send + Sync {
    /// Lists interface names known to the runtime.
    fn list_interfaces(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Inspects one interface with its peers and counters.
    ///
    /// Returns `Ok(None)` when the interface does not exist; "No such
    /// device" style diagnostics are mapped here, never propagated.
    fn interface(&self, name: &str) -> impl Future<Output = Result<Option<RuntimeInterface>>> + Send;

    /// Adds a peer. Idempotent in effect: re-adding updates attributes.
    fn add_peer(&self, name: &str, peer: &PeerSpec) -> impl Future<Output = Result<()>> + Send;

    /// Removes a peer by public key.
    ///
    /// With `ignore_missing`, "peer not found" diagnostics count as success.
    fn remove_peer(
        &self,
        name: &str,
        public_key: &str,
        ignore_missing: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Updates a peer; semantically equivalent to [`Self::add_peer`].
    fn update_peer(&self, name: &str, peer: &PeerSpec) -> impl Future<Output = Result<()>> + Send;

    /// Brings the link up or down.
    fn toggle_interface(&self, name: &str, up: bool) -> impl Future<Output = Result<()>> + Send;

    /// Ensures the link exists, applies key/port/address, sets it up.
    fn up_interface(
        &self,
        name: &str,
        provision: &InterfaceProvision,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Best-effort host identification. Never fails.
    fn host_info(&self) -> impl Future<Output = HostInfo> + Send;
}
