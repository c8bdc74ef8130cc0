//! WireGuard key types.
//!
//! WireGuard uses Curve25519 for key exchange. Keys are 32 bytes and travel
//! base64-encoded everywhere outside this crate.

use std::fmt;

use base64::Engine;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::WireError;

/// WireGuard key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

/// A WireGuard public key (Curve25519, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a public key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the raw bytes of the public key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a public key from base64.
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
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        let short = &b64[..8.min(b64.len())];
        write!(f, "PublicKey({short}...)")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(key: X25519PublicKey) -> Self {
        Self::from_bytes_array(*key.as_bytes())
    }
}

/// A WireGuard private key (Curve25519, 32 bytes).
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    /// Creates a private key from a 32-byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a private key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the raw bytes of the private key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        let public = X25519PublicKey::from(&secret);
        PublicKey::from(public)
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a private key from base64.
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
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// A WireGuard key pair (private + public).
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let private = PrivateKey::generate();
        let public = private.public_key();
        Self { private, public }
    }

    /// Creates a key pair from an existing private key.
    #[must_use]
    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Returns a reference to the private key.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Returns a reference to the public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

/// Generates a new WireGuard keypair.
#[must_use]
pub fn generate_keypair() -> (PrivateKey, PublicKey) {
    let private = PrivateKey::generate();
    let public = private.public_key();
    (private, public)
}

/// Derives the base64 public key for a base64 private key.
///
/// # Errors
///
/// Returns an error if the input is not valid base64 decoding to 32 bytes.
pub fn derive_public(private_b64: &str) -> Result<String, WireError> {
    let private = PrivateKey::from_base64(private_b64)?;
    Ok(private.public_key().to_base64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_generate_produces_valid_key() {
        let key = PrivateKey::generate();
        assert_eq!(key.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn private_key_to_public_key_is_deterministic() {
        let private = PrivateKey::generate();
        let public1 = private.public_key();
        let public2 = private.public_key();
        assert_eq!(public1, public2);
    }

    #[test]
    fn different_private_keys_produce_different_public_keys() {
        let private1 = PrivateKey::generate();
        let private2 = PrivateKey::generate();
        assert_ne!(private1.public_key(), private2.public_key());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let private = PrivateKey::generate();
        let public = private.public_key();
        let encoded = public.to_base64();
        let decoded = PublicKey::from_base64(&encoded).expect("decode failed");
        assert_eq!(public, decoded);
    }

    #[test]
    fn private_key_base64_roundtrip() {
        let private = PrivateKey::generate();
        let encoded = private.to_base64();
        let decoded = PrivateKey::from_base64(&encoded).expect("decode failed");
        assert_eq!(private, decoded);
    }

    #[test]
    fn private_key_debug_redacts() {
        let private = PrivateKey::generate();
        let debug = format!("{private:?}");
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn public_key_serde_roundtrip() {
        let private = PrivateKey::generate();
        let public = private.public_key();
        let json = serde_json::to_string(&public).expect("serialize failed");
        let deserialized: PublicKey = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(public, deserialized);
    }

    #[test]
    fn derive_public_matches_keypair() {
        let pair = KeyPair::generate();
        let derived = derive_public(&pair.private_key().to_base64()).expect("derive");
        assert_eq!(derived, pair.public_key().to_base64());
    }

    #[test]
    fn derive_public_rejects_short_key() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(matches!(
            derive_public(&b64),
            Err(WireError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn derive_public_rejects_garbage() {
        assert!(matches!(
            derive_public("not-base64!!!"),
            Err(WireError::InvalidBase64(_))
        ));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_bytes = [0u8; 16];
        assert!(PrivateKey::from_bytes(&short_bytes).is_err());
        assert!(PublicKey::from_bytes(&short_bytes).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn public_key_base64_roundtrip_prop(bytes in prop::array::uniform32(any::<u8>())) {
                let public = PublicKey::from_bytes_array(bytes);
                let encoded = public.to_base64();
                let decoded = PublicKey::from_base64(&encoded);
                prop_assert!(decoded.is_ok());
                prop_assert_eq!(public, decoded.unwrap());
            }

            #[test]
            fn keypair_derivation_consistent(seed: [u8; 32]) {
                let private = PrivateKey::from_bytes_array(seed);
                let public1 = private.public_key();
                let public2 = private.public_key();
                prop_assert_eq!(public1, public2);
            }
        }
    }
}
