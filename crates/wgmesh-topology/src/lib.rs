//! Mesh topology resolution and configuration synthesis.
//!
//! Turns a declarative [`MeshSpec`] into a [`ResolvedMesh`] (deterministic
//! IP plan, filled keys, gateway links, neighbor adjacency) and emits the
//! per-peer configuration artifacts: `.conf` texts, optional routing-daemon
//! fragments, a manifest, and a zip bundle.

pub mod archive;
pub mod error;
pub mod manifest;
pub mod resolver;
pub mod spec;
pub mod synth;

pub use error::{Result, TopologyError};
pub use manifest::Manifest;
pub use resolver::{neighbor_indices, resolve, ResolvedClient, ResolvedMesh, ResolvedNode};
pub use spec::{ClientInput, EndpointVersion, MeshSpec, NodeInput, PskMode};
pub use synth::{
    format_endpoint, node_deployment, psk_book_for, sanitize_filename, synthesize, DeployPeer,
    MeshBundle, NodeDeployment, PeerArtifact,
};
