//! Signature codec
//!
//! Packets are signed over a domain-separated canonical encoding of the
//! unsigned packet. Verification is a pure boolean check; an invalid
//! signature is an expected outcome, not an error.

use crate::errors::{Result, VouchError};
use crate::identity::{NodeIdentity, PacketSignature, PublicKey};
use crate::packet::{Packet, SignedPacket};
use crate::serialization::to_canonical_vec;

/// Domain separator prepended to every packet signing payload
pub const PACKET_SIGNING_DOMAIN: &[u8] = b"VOUCH_PACKET_v1";

/// Canonical bytes a packet's signature covers
pub fn signing_bytes(packet: &Packet) -> Result<Vec<u8>> {
    let body = to_canonical_vec(packet)?;
    let mut bytes = Vec::with_capacity(PACKET_SIGNING_DOMAIN.len() + body.len());
    bytes.extend_from_slice(PACKET_SIGNING_DOMAIN);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Sign serialized packet bytes
pub fn sign(message: &[u8], identity: &NodeIdentity) -> PacketSignature {
    identity.sign(message)
}

/// Verify serialized packet bytes against a signature and key
pub fn verify(message: &[u8], signature: &PacketSignature, public_key: &PublicKey) -> bool {
    public_key.verify(message, signature)
}

impl SignedPacket {
    /// Sign `packet` with `identity`.
    ///
    /// The packet's source must name the signing identity, otherwise the
    /// result could never verify.
    pub fn sign(packet: Packet, identity: &NodeIdentity) -> Result<Self> {
        if packet.source().public_key != identity.public_key() {
            return Err(VouchError::invalid(format!(
                "Packet source {} does not match signing identity {}",
                packet.source().public_key.short(),
                identity.public_key().short()
            )));
        }
        let signature = sign(&signing_bytes(&packet)?, identity);
        Ok(Self { packet, signature })
    }

    /// Whether this hop's signature verifies against its declared source.
    ///
    /// Only the outermost hop is checked; chain validation lives in the
    /// resolver.
    pub fn verify_own(&self) -> bool {
        match signing_bytes(&self.packet) {
            Ok(bytes) => verify(&bytes, &self.signature, &self.source().public_key),
            Err(_) => false,
        }
    }
}
