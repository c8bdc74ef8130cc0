//! Lock-guarded load/update over the persisted document.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{Result, StateError};
use crate::lock::StateLock;
use crate::types::PersistedState;

/// The state store: one JSON document, one lock, atomic replacement.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl StateStore {
    /// Creates a store over `state_path` with the default sibling lock.
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = PathBuf::from(format!("{}.lock", state_path.display()));
        Self {
            state_path,
            lock_path,
        }
    }

    /// Creates a store with an explicit lock path.
    #[must_use]
    pub fn with_lock_path(state_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            lock_path: lock_path.into(),
        }
    }

    /// The state file path.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Loads the current state under the lock.
    ///
    /// A missing file yields a fresh empty state.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout`, `CorruptState`, or `Io`.
    pub fn load(&self) -> Result<PersistedState> {
        let _lock = StateLock::acquire(&self.lock_path)?;
        self.read_unlocked()
    }

    /// Loads, applies `f`, and persists atomically, all under the lock.
    ///
    /// `f` may mutate the state freely; nothing is written unless it
    /// returns `Ok`, and its value is passed through.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or a store error lifted into `E`.
    pub fn update<T, E>(&self, f: impl FnOnce(&mut PersistedState) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StateError>,
    {
        let _lock = StateLock::acquire(&self.lock_path).map_err(E::from)?;
        let mut state = self.read_unlocked().map_err(E::from)?;
        let value = f(&mut state)?;
        self.persist(&state).map_err(E::from)?;
        Ok(value)
    }

    fn read_unlocked(&self) -> Result<PersistedState> {
        let contents = match std::fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.state_path.display(), "no state file, starting empty");
                return Ok(PersistedState::empty());
            }
            Err(err) => return Err(StateError::Io(err)),
        };

        let state: PersistedState = serde_json::from_str(&contents)
            .map_err(|e| StateError::CorruptState(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    /// Write-to-temp, fsync, rename, best-effort directory fsync.
    fn persist(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Serialize(e.to_string()))?;

        let tmp_path = PathBuf::from(format!(
            "{}.tmp.{}",
            self.state_path.display(),
            unix_ms()
        ));

        let outcome = write_and_swap(&tmp_path, &self.state_path, json.as_bytes());
        if outcome.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        outcome
    }
}

fn write_and_swap(tmp_path: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut file = std::fs::File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(tmp_path, dest)?;

    // Make the rename itself durable; failure here loses nothing visible.
    if let Some(parent) = dest.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InterfaceRecord, Peer, DEFAULT_INTERFACE};
    use chrono::Utc;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join("wg-mesh-state.json"))
    }

    fn sample_peer(interface: &str) -> Peer {
        Peer {
            peer_id: uuid::Uuid::new_v4().to_string(),
            name: "laptop".to_string(),
            public_key: "pub==".to_string(),
            private_key: None,
            allowed_ips: vec!["10.0.0.2/32".to_string()],
            endpoint: Some("203.0.113.9:51820".to_string()),
            persistent_keepalive: Some(25),
            is_active: true,
            interface: interface.to_string(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = store_in(&dir).load().expect("load");
        assert_eq!(state.version, 1);
        assert!(state.interfaces.is_empty());
        assert!(state.peers.is_empty());
    }

    #[test]
    fn update_persists_and_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let revision = store
            .update::<_, StateError>(|state| {
                let mut record = InterfaceRecord::synthetic();
                record.listen_port = 51820;
                record.revision = 3;
                state.interfaces.insert("wg0".to_string(), record);
                state.peers.push(sample_peer(DEFAULT_INTERFACE));
                state.updated_at = Utc::now();
                Ok(state.interfaces["wg0"].revision)
            })
            .expect("update");
        assert_eq!(revision, 3);

        let loaded = store.load().expect("reload");
        assert_eq!(loaded.interfaces["wg0"].revision, 3);
        assert_eq!(loaded.peers.len(), 1);
        assert_eq!(loaded.peers[0].name, "laptop");
    }

    #[test]
    fn save_load_save_is_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .update::<_, StateError>(|state| {
                state.peers.push(sample_peer("wg1"));
                Ok(())
            })
            .expect("seed");

        let first = std::fs::read_to_string(store.state_path()).expect("read");
        let reloaded = store.load().expect("load");
        store
            .update::<_, StateError>(|state| {
                *state = reloaded.clone();
                Ok(())
            })
            .expect("rewrite");
        let second = std::fs::read_to_string(store.state_path()).expect("read");
        assert_eq!(first, second);
    }

    #[test]
    fn failed_closure_leaves_state_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .update::<_, StateError>(|state| {
                state.peers.push(sample_peer("wg0"));
                Ok(())
            })
            .expect("seed");

        let result = store.update::<(), StateError>(|state| {
            state.peers.clear();
            Err(StateError::CorruptState("abort".to_string()))
        });
        assert!(result.is_err());

        let loaded = store.load().expect("load");
        assert_eq!(loaded.peers.len(), 1);
    }

    #[test]
    fn corrupt_json_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.state_path(), "{not json").expect("write");

        assert!(matches!(store.load(), Err(StateError::CorruptState(_))));
    }

    #[test]
    fn unknown_schema_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(
            store.state_path(),
            r#"{"version":1,"updatedAt":"2026-01-01T00:00:00Z","interfaces":{},"peers":[],"extra":1}"#,
        )
        .expect("write");

        assert!(matches!(store.load(), Err(StateError::CorruptState(_))));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store
            .update::<_, StateError>(|state| {
                state.peers.push(sample_peer("wg0"));
                Ok(())
            })
            .expect("update");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn concurrent_updates_serialize() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .update::<_, StateError>(|state| {
                            state.peers.push(sample_peer("wg0"));
                            Ok(())
                        })
                        .expect("update");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        let loaded = store.load().expect("load");
        assert_eq!(loaded.peers.len(), 4);
    }
}
