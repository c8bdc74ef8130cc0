//! Runtime adapter backed by the external `wg` and `ip` tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::adapter::RuntimeAdapter;
use crate::error::{Result, RuntimeError};
use crate::types::{HostInfo, InterfaceProvision, PeerSpec, RuntimeInterface, RuntimePeer};

/// Sentinel `wg … dump` prints for absent optional fields.
const DUMP_NONE: &str = "(none)";

/// Shell-out implementation of [`RuntimeAdapter`].
#[derive(Debug, Clone)]
pub struct WgCli {
    wg_bin: String,
    ip_bin: String,
}

impl WgCli {
    /// Creates an adapter using `wg` and `ip` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            wg_bin: "wg".to_string(),
            ip_bin: "ip".to_string(),
        }
    }

    /// Overrides the binary paths (tests, unusual installs).
    #[must_use]
    pub fn with_binaries(wg_bin: impl Into<String>, ip_bin: impl Into<String>) -> Self {
        Self {
            wg_bin: wg_bin.into(),
            ip_bin: ip_bin.into(),
        }
    }

    async fn run(&self, bin: &str, args: &[&str]) -> Result<String> {
        debug!(bin, ?args, "running control command");
        let output = Command::new(bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::command(
                format!("{bin} {} failed", args.join(" ")),
                output.status.code(),
                &stderr,
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn wg(&self, args: &[&str]) -> Result<String> {
        self.run(&self.wg_bin, args).await
    }

    async fn ip(&self, args: &[&str]) -> Result<String> {
        self.run(&self.ip_bin, args).await
    }

    async fn set_peer(&self, name: &str, peer: &PeerSpec) -> Result<()> {
        let allowed = peer.allowed_ips.join(",");
        let keepalive = peer.persistent_keepalive.map(|k| k.to_string());

        // The PSK goes through a 0600 file so it never shows up in argv.
        let psk_file = peer
            .preshared_key
            .as_deref()
            .map(SecretFile::write)
            .transpose()?;

        let mut args = vec!["set", name, "peer", &peer.public_key];
        if let Some(psk_file) = &psk_file {
            args.push("preshared-key");
            args.push(psk_file.path_str());
        }
        if let Some(endpoint) = &peer.endpoint {
            args.push("endpoint");
            args.push(endpoint);
        }
        if let Some(keepalive) = &keepalive {
            args.push("persistent-keepalive");
            args.push(keepalive);
        }
        args.push("allowed-ips");
        args.push(&allowed);

        self.wg(&args).await?;
        Ok(())
    }
}

impl Default for WgCli {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeAdapter for WgCli {
    async fn list_interfaces(&self) -> Result<Vec<String>> {
        let out = self.wg(&["show", "interfaces"]).await?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    async fn interface(&self, name: &str) -> Result<Option<RuntimeInterface>> {
        match self.wg(&["show", name, "dump"]).await {
            Ok(dump) => Ok(Some(parse_dump(&dump)?)),
            Err(err) if err.is_not_exists() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn add_peer(&self, name: &str, peer: &PeerSpec) -> Result<()> {
        debug!(interface = %name, peer = %peer.public_key, "adding peer");
        self.set_peer(name, peer).await
    }

    async fn remove_peer(&self, name: &str, public_key: &str, ignore_missing: bool) -> Result<()> {
        debug!(interface = %name, peer = %public_key, "removing peer");
        match self.wg(&["set", name, "peer", public_key, "remove"]).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::Command { stderr, .. })
                if ignore_missing
                    && stderr
                        .as_deref()
                        .is_some_and(|s| s.to_ascii_lowercase().contains("not found")) =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn update_peer(&self, name: &str, peer: &PeerSpec) -> Result<()> {
        debug!(interface = %name, peer = %peer.public_key, "updating peer");
        self.set_peer(name, peer).await
    }

    async fn toggle_interface(&self, name: &str, up: bool) -> Result<()> {
        let state = if up { "up" } else { "down" };
        self.ip(&["link", "set", name, state]).await?;
        Ok(())
    }

    async fn up_interface(&self, name: &str, provision: &InterfaceProvision) -> Result<()> {
        // Ensure the link exists; an already-present link is fine.
        if let Err(err) = self.ip(&["link", "add", name, "type", "wireguard"]).await {
            if !is_already_exists(&err) {
                return Err(err);
            }
        }

        if let Some(private_key) = &provision.private_key {
            let key_file = SecretFile::write(private_key)?;
            let port = provision.listen_port.to_string();
            self.wg(&[
                "set",
                name,
                "private-key",
                key_file.path_str(),
                "listen-port",
                &port,
            ])
            .await?;
        }

        if let Some(address) = &provision.address {
            if let Err(err) = self.ip(&["addr", "add", address, "dev", name]).await {
                if !is_already_exists(&err) {
                    return Err(err);
                }
            }
        }

        self.ip(&["link", "set", name, "up"]).await?;
        Ok(())
    }

    async fn host_info(&self) -> HostInfo {
        let hostname = nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let version = match self.wg(&["--version"]).await {
            Ok(out) => out.lines().next().unwrap_or("unknown").trim().to_string(),
            Err(err) => {
                warn!(error = %err, "could not read wg version");
                "unknown".to_string()
            }
        };

        HostInfo { hostname, version }
    }
}

fn is_already_exists(err: &RuntimeError) -> bool {
    let RuntimeError::Command { stderr, .. } = err else {
        return false;
    };
    stderr
        .as_deref()
        .is_some_and(|s| s.contains("File exists") || s.contains("already exists"))
}

/// Parses `wg show <iface> dump` output.
///
/// The first line carries four interface fields, every following line eight
/// peer fields, all tab-separated.
fn parse_dump(dump: &str) -> Result<RuntimeInterface> {
    let mut lines = dump.lines().filter(|l| !l.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| RuntimeError::Dump("empty dump".to_string()))?;
    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() != 4 {
        return Err(RuntimeError::Dump(format!(
            "expected 4 interface fields, got {}",
            fields.len()
        )));
    }

    let mut iface = RuntimeInterface {
        private_key: dump_optional(fields[0]).map(str::to_string),
        public_key: dump_optional(fields[1]).map(str::to_string),
        listen_port: fields[2].parse().unwrap_or(0),
        fwmark: match fields[3] {
            "off" => None,
            raw => raw.trim_start_matches("0x").parse().ok(),
        },
        ..RuntimeInterface::default()
    };

    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 8 {
            return Err(RuntimeError::Dump(format!(
                "expected 8 peer fields, got {}",
                fields.len()
            )));
        }
        iface.peers.push(RuntimePeer {
            public_key: fields[0].to_string(),
            preshared_key: dump_optional(fields[1]).map(str::to_string),
            endpoint: dump_optional(fields[2]).map(str::to_string),
            allowed_ips: match dump_optional(fields[3]) {
                Some(csv) => csv.split(',').map(str::to_string).collect(),
                None => Vec::new(),
            },
            latest_handshake: fields[4].parse().unwrap_or(0),
            transfer_rx: fields[5].parse().unwrap_or(0),
            transfer_tx: fields[6].parse().unwrap_or(0),
            persistent_keepalive: match fields[7] {
                "off" => None,
                raw => raw.parse().ok(),
            },
        });
    }

    Ok(iface)
}

fn dump_optional(field: &str) -> Option<&str> {
    (field != DUMP_NONE && !field.is_empty()).then_some(field)
}

/// A secret written to a uniquely-named 0600 file, unlinked on drop.
struct SecretFile {
    path: PathBuf,
    path_str: String,
}

impl SecretFile {
    fn write(secret: &str) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("wgmesh-{}.key", Uuid::new_v4()));
        write_secret(&path, secret)?;
        let path_str = path.to_string_lossy().into_owned();
        Ok(Self { path, path_str })
    }

    fn path_str(&self) -> &str {
        &self.path_str
    }
}

impl Drop for SecretFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "could not remove secret file");
            }
        }
    }
}

#[cfg(unix)]
fn write_secret(path: &Path, secret: &str) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(secret.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(not(unix))]
fn write_secret(path: &Path, secret: &str) -> Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(secret.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
