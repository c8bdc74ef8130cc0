//! Persisted interface state.
//!
//! A single JSON document describes every managed interface and its peers.
//! It is protected by a sibling lock file with stale-owner detection and
//! replaced atomically on every write, so concurrent readers and writers in
//! other processes observe either the full prior state or the full new one.

pub mod error;
pub mod lock;
pub mod store;
pub mod types;

pub use error::{Result, StateError};
pub use lock::StateLock;
pub use store::StateStore;
pub use types::{InterfaceRecord, Peer, PersistedState, DEFAULT_INTERFACE, STATE_VERSION};
