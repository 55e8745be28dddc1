//! Ed25519 identities for broadcasters and relayers
//!
//! A broadcaster is identified by its Ed25519 public key. The same key is what
//! a peer's camera reads off the broadcaster's visual marker, so `PublicKey`
//! is both the signature verifier and the sensing registry key.

use crate::errors::{Result, VouchError};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of an Ed25519 public key in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// Public key identifying a broadcaster. Hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse key bytes from a slice of exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            VouchError::invalid(format!(
                "Invalid public key length: expected {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded key
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value)
            .map_err(|e| VouchError::invalid(format!("Invalid public key hex: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Parse a key as read off a visual marker.
    ///
    /// Scanners hand back the payload with embedded line breaks and padding,
    /// so all whitespace is stripped before decoding.
    pub fn from_scanned(value: &str) -> Result<Self> {
        let normalized: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        Self::from_hex(&normalized)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Hex encoding used on the wire and in markers
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Shortened form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Verify `signature` over `message`.
    ///
    /// Keys that do not decode to a valid curve point verify nothing.
    pub fn verify(&self, message: &[u8], signature: &PacketSignature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(&signature.0)).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = VouchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature over a packet's canonical bytes. Hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketSignature([u8; SIGNATURE_LENGTH]);

impl PacketSignature {
    /// Wrap raw signature bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse signature bytes from a slice of exactly 64 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            VouchError::crypto(format!(
                "Invalid signature length: expected {SIGNATURE_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw signature bytes
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0
    }
}

impl fmt::Debug for PacketSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketSignature({}..)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for PacketSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PacketSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        let bytes = hex::decode(&value).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// This node's own key pair.
///
/// The signing key never leaves the process and is not printed by `Debug`.
#[derive(Clone)]
pub struct NodeIdentity {
    signing_key: SigningKey,
}

impl NodeIdentity {
    /// Generate a fresh key pair from the OS random source
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build an identity from a 32-byte secret seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Build an identity from 64 bytes of `seed || public key`
    pub fn from_keypair_bytes(bytes: &[u8; 64]) -> Result<Self> {
        let signing_key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| VouchError::identity(format!("Invalid key pair bytes: {e}")))?;
        Ok(Self { signing_key })
    }

    /// Public half of the key pair
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.signing_key.verifying_key())
    }

    /// Secret seed bytes, for writing key files
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, message: &[u8]) -> PacketSignature {
        PacketSignature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let identity = NodeIdentity::from_seed(&[7u8; 32]);
        let signature = identity.sign(b"hello world");

        assert!(identity.public_key().verify(b"hello world", &signature));
        assert!(!identity.public_key().verify(b"wrong data", &signature));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_keypair_bytes_roundtrip() {
        let identity = NodeIdentity::from_seed(&[3u8; 32]);
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&identity.seed());
        bytes[32..].copy_from_slice(identity.public_key().as_bytes());

        let restored = NodeIdentity::from_keypair_bytes(&bytes).unwrap();
        assert_eq!(restored.public_key(), identity.public_key());
    }

    #[test]
    fn test_keypair_bytes_mismatch_rejected() {
        let identity = NodeIdentity::from_seed(&[3u8; 32]);
        let other = NodeIdentity::from_seed(&[4u8; 32]);
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&identity.seed());
        bytes[32..].copy_from_slice(other.public_key().as_bytes());

        assert!(matches!(
            NodeIdentity::from_keypair_bytes(&bytes),
            Err(VouchError::Identity { .. })
        ));
    }

    #[test]
    fn test_scanned_key_normalization() {
        let key = NodeIdentity::from_seed(&[9u8; 32]).public_key();
        let hex = key.to_hex();
        let scanned = format!("{}\r\n{}\n", &hex[..20], &hex[20..]);

        assert_eq!(PublicKey::from_scanned(&scanned).unwrap(), key);
    }

    #[test]
    fn test_public_key_rejects_bad_length() {
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(PublicKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_arbitrary_key_bytes_never_verify_zero_signature() {
        let mut bytes = [0u8; 32];
        bytes[0] = 2;
        let key = PublicKey::from_bytes(bytes);
        let signature = PacketSignature::from_bytes([0u8; 64]);
        assert!(!key.verify(b"anything", &signature));
    }

    #[test]
    fn test_serde_hex() {
        let key = NodeIdentity::from_seed(&[1u8; 32]).public_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
