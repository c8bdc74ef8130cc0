//! Key material and address-plan primitives for WireGuard mesh provisioning.
//!
//! This crate provides the Curve25519 key types used for peer identity,
//! preshared-key derivation over unordered peer pairs, and the IPv4 CIDR
//! arithmetic behind the deterministic mesh address plan.

pub mod cidr;
pub mod error;
pub mod keys;
pub mod psk;

pub use cidr::CidrPlan;
pub use error::{Result, WireError};
pub use keys::{generate_keypair, KeyPair, PrivateKey, PublicKey, KEY_SIZE};
pub use psk::{DerivedPskSource, PresharedKey, PskBook, PskSource, RandomPskSource};
