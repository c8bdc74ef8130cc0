//! Preshared keys and pair-wise derivation strategies.
//!
//! A PSK belongs to the UNORDERED pair of peer names: `psk_for(a, b)` and
//! `psk_for(b, a)` must be the same key. [`PskBook`] memoises one key per
//! pair for the lifetime of a synthesis run so both sides of a tunnel see
//! the same value regardless of emission order.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::WireError;
use crate::keys::KEY_SIZE;

/// Domain-separation label for the deterministic derivation.
const DERIVE_LABEL: &str = "wg-mesh-psk::";

/// A WireGuard preshared key (32 bytes).
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    /// Creates from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Returns the raw bytes of the preshared key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a preshared key from base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or wrong length.
    pub fn from_base64(s: &str) -> Result<Self, WireError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| WireError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Generates a new random preshared key using OS-level entropy.
    ///
    /// Uses `OsRng` directly instead of `thread_rng()` because cryptographic
    /// key material should come directly from the operating system's CSPRNG
    /// rather than a userspace PRNG that is merely seeded from system entropy.
    #[must_use]
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}

impl TryFrom<String> for PresharedKey {
    type Error = WireError;

    fn try_from(s: String) -> Result<Self, WireError> {
        Self::from_base64(&s)
    }
}

impl From<PresharedKey> for String {
    fn from(key: PresharedKey) -> Self {
        key.to_base64()
    }
}

/// Strategy for producing the preshared key of an unordered peer pair.
pub trait PskSource {
    /// Returns the PSK for the pair `{a, b}`. Must be order-insensitive.
    fn psk_for(&self, a: &str, b: &str) -> PresharedKey;
}

/// Deterministic derivation: `SHA-256(label + sort(a, b).join("::"))`.
///
/// Byte-compatible with existing exports. Anyone who knows the peer names
/// can reconstruct these keys, so prefer [`RandomPskSource`] when the
/// manifest does not need to be reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedPskSource;

impl PskSource for DerivedPskSource {
    fn psk_for(&self, a: &str, b: &str) -> PresharedKey {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(DERIVE_LABEL.as_bytes());
        hasher.update(lo.as_bytes());
        hasher.update(b"::");
        hasher.update(hi.as_bytes());
        let digest = hasher.finalize();
        PresharedKey::from_bytes(digest.as_slice()).expect("SHA-256 digest is 32 bytes")
    }
}

/// Fresh CSPRNG key per pair. Pair-commutativity comes from the memoisation
/// in [`PskBook`], not from the source itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPskSource;

impl PskSource for RandomPskSource {
    fn psk_for(&self, _a: &str, _b: &str) -> PresharedKey {
        PresharedKey::generate()
    }
}

/// Per-synthesis cache of pair PSKs.
pub struct PskBook {
    source: Box<dyn PskSource + Send + Sync>,
    cache: HashMap<(String, String), PresharedKey>,
}

impl PskBook {
    /// Creates a book over the given source.
    #[must_use]
    pub fn new(source: Box<dyn PskSource + Send + Sync>) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    /// Creates a book over the deterministic derivation.
    #[must_use]
    pub fn derived() -> Self {
        Self::new(Box::new(DerivedPskSource))
    }

    /// Creates a book over the CSPRNG source.
    #[must_use]
    pub fn random() -> Self {
        Self::new(Box::new(RandomPskSource))
    }

    /// Returns the PSK for the unordered pair `{a, b}`, computing it at
    /// most once per book.
    pub fn get(&mut self, a: &str, b: &str) -> PresharedKey {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        if let Some(psk) = self.cache.get(&key) {
            return psk.clone();
        }
        let psk = self.source.psk_for(a, b);
        self.cache.insert(key, psk.clone());
        psk
    }

    /// All cached pairs, keyed `"a::b"` with sorted components.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, PresharedKey)> {
        let mut out: Vec<_> = self
            .cache
            .iter()
            .map(|((a, b), psk)| (format!("{a}::{b}"), psk.clone()))
            .collect();
        out.sort_by(|x, y| x.0.cmp(&y.0));
        out
    }
}

impl fmt::Debug for PskBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskBook")
            .field("pairs", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_psk_is_pair_commutative() {
        let source = DerivedPskSource;
        assert_eq!(source.psk_for("alpha", "beta"), source.psk_for("beta", "alpha"));
    }

    #[test]
    fn derived_psk_differs_across_pairs() {
        let source = DerivedPskSource;
        assert_ne!(source.psk_for("a", "b"), source.psk_for("a", "c"));
    }

    #[test]
    fn derived_psk_is_stable() {
        let psk = DerivedPskSource.psk_for("node-2", "node-1");
        use sha2::{Digest, Sha256};
        let expected = Sha256::digest(b"wg-mesh-psk::node-1::node-2");
        assert_eq!(psk.as_bytes(), expected.as_slice());
    }

    #[test]
    fn random_psks_differ_per_call() {
        let source = RandomPskSource;
        assert_ne!(source.psk_for("a", "b"), source.psk_for("a", "b"));
    }

    #[test]
    fn book_memoises_unordered_pairs() {
        let mut book = PskBook::random();
        let first = book.get("n1", "n2");
        let second = book.get("n2", "n1");
        assert_eq!(first, second);
        assert_eq!(book.pairs().len(), 1);
    }

    #[test]
    fn book_pairs_are_sorted() {
        let mut book = PskBook::derived();
        book.get("zeta", "alpha");
        book.get("beta", "alpha");
        let pairs = book.pairs();
        assert_eq!(pairs[0].0, "alpha::beta");
        assert_eq!(pairs[1].0, "alpha::zeta");
    }

    #[test]
    fn preshared_key_base64_roundtrip() {
        let psk = PresharedKey::generate();
        let decoded = PresharedKey::from_base64(&psk.to_base64()).expect("decode");
        assert_eq!(psk, decoded);
    }

    #[test]
    fn preshared_key_debug_redacts() {
        let psk = PresharedKey::generate();
        assert!(format!("{psk:?}").contains("REDACTED"));
    }

    #[test]
    fn preshared_key_rejects_wrong_length() {
        assert!(PresharedKey::from_bytes(&[0u8; 31]).is_err());
    }
}
