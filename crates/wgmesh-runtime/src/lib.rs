//! Runtime adapter for live WireGuard interfaces.
//!
//! The [`RuntimeAdapter`] trait is the contract between the provisioning
//! service and whatever actually controls the kernel: the shipped
//! implementation ([`WgCli`]) shells out to the external `wg` and `ip`
//! tools, and [`FakeRuntime`] is an in-memory double for tests.

pub mod adapter;
pub mod error;
pub mod fake;
pub mod types;
pub mod wg;

pub use adapter::RuntimeAdapter;
pub use error::{Result, RuntimeError};
pub use fake::FakeRuntime;
pub use types::{HostInfo, InterfaceProvision, PeerSpec, RuntimeInterface, RuntimePeer};
pub use wg::WgCli;
