//! Canonical and wire serialization
//!
//! Two encodings are in play:
//! - DAG-CBOR is the canonical form hashed and signed. It is deterministic,
//!   so a signer and a verifier always derive identical bytes.
//! - JSON is the transport encoding exchanged between nodes.

use crate::errors::{Result, VouchError};
use crate::packet::SignedPacket;
use serde::{Deserialize, Serialize};

/// Serialize any serde-compatible type to canonical DAG-CBOR bytes
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| {
        VouchError::serialization(format!("Failed to serialize to DAG-CBOR: {e}"))
    })
}

/// Deserialize canonical DAG-CBOR bytes
pub fn from_canonical_slice<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| VouchError::serialization(format!("Invalid DAG-CBOR: {e}")))
}

/// Encode a signed packet for the transport
pub fn encode_wire(packet: &SignedPacket) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(packet)?)
}

/// Decode a signed packet received from the transport.
///
/// Any malformed payload is reported as a serialization error; signatures are
/// not checked here.
pub fn decode_wire(bytes: &[u8]) -> Result<SignedPacket> {
    Ok(serde_json::from_slice(bytes)?)
}
