//! Daemon configuration from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use wgmesh_state::StateStore;

/// Default location of the persisted state document.
pub const DEFAULT_STATE_FILE: &str = "/etc/wireguard/wg-mesh-state.json";

/// Server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "wgmeshd", about = "WireGuard mesh provisioning service")]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    #[arg(long, env = "WG_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Path of the persisted state document.
    #[arg(long, env = "WG_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Lock file path; defaults to `<state-file>.lock`.
    #[arg(long, env = "WG_LOCK_FILE")]
    pub lock_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Builds the state store this configuration describes.
    #[must_use]
    pub fn store(&self) -> StateStore {
        match &self.lock_file {
            Some(lock) => StateStore::with_lock_path(&self.state_file, lock),
            None => StateStore::new(&self.state_file),
        }
    }
}
