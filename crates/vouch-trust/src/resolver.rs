//! Packet chain resolution
//!
//! A received packet embeds the full relay chain back to its root broadcast.
//! The resolver walks that chain iteratively, bounded by `max_chain_depth`,
//! and verifies every hop's own signature before trusting the root.
//!
//! Depth counts the root broadcast as 1; every rebroadcast hop adds 1.

use thiserror::Error;
use tracing::trace;
use vouch_core::{
    GroupingKey, Location, PacketInformation, PublicKey, SignedPacket, TrustConfig,
};

/// Why a chain could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// A hop's signature does not verify against its declared signer.
    ///
    /// `hop` counts from the outermost packet, which is hop 0.
    #[error("invalid signature at hop {hop} (signer {signer})")]
    InvalidSignature {
        /// Position of the failing hop
        hop: u32,
        /// Declared signer of the failing hop
        signer: PublicKey,
    },
    /// The chain has more hops than the resolver accepts
    #[error("chain exceeds {max_depth} hops")]
    TooDeep {
        /// Configured maximum depth
        max_depth: u32,
    },
}

/// Iterator over a chain, outermost hop first.
///
/// Yields at most `max_depth + 1` hops so callers can detect over-deep chains
/// without walking them in full.
#[derive(Debug, Clone)]
pub struct Hops<'a> {
    next: Option<&'a SignedPacket>,
    remaining: u32,
}

impl<'a> Iterator for Hops<'a> {
    type Item = &'a SignedPacket;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;
        self.next = current.packet.inner();
        Some(current)
    }
}

/// Walks and verifies rebroadcast chains
#[derive(Debug, Clone, Copy)]
pub struct ChainResolver {
    max_depth: u32,
}

impl ChainResolver {
    /// Resolver accepting chains of up to `max_depth` hops
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    /// Resolver using `config.max_chain_depth`
    pub fn from_config(config: &TrustConfig) -> Self {
        Self::new(config.max_chain_depth)
    }

    /// Configured maximum depth
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Hops of `packet`, outermost first, bounded by the depth guard
    pub fn hops<'a>(&self, packet: &'a SignedPacket) -> Hops<'a> {
        Hops {
            next: Some(packet),
            remaining: self.max_depth.saturating_add(1),
        }
    }

    /// Collect the chain, rejecting it if it is too deep
    fn chain<'a>(&self, packet: &'a SignedPacket) -> Result<Vec<&'a SignedPacket>, ChainError> {
        let chain: Vec<_> = self.hops(packet).collect();
        let complete = chain.last().is_some_and(|hop| hop.is_broadcast());
        if !complete || chain.len() as u32 > self.max_depth {
            return Err(ChainError::TooDeep {
                max_depth: self.max_depth,
            });
        }
        Ok(chain)
    }

    /// Number of hops, without checking signatures
    pub fn depth(&self, packet: &SignedPacket) -> Result<u32, ChainError> {
        Ok(self.chain(packet)?.len() as u32)
    }

    /// Verify every hop and return the packet's resolved view
    pub fn resolve(&self, packet: &SignedPacket) -> Result<PacketInformation, ChainError> {
        let chain = self.chain(packet)?;

        for (hop, signed) in chain.iter().enumerate() {
            if !signed.verify_own() {
                return Err(ChainError::InvalidSignature {
                    hop: hop as u32,
                    signer: signed.source().public_key,
                });
            }
        }

        let depth = chain.len() as u32;
        let original = chain[chain.len() - 1].clone();
        trace!(depth, root = %original.source().public_key, "Resolved packet chain");

        Ok(PacketInformation {
            depth,
            original,
            packet: packet.clone(),
        })
    }

    /// The verified root broadcast of `packet`
    pub fn original_of(&self, packet: &SignedPacket) -> Result<SignedPacket, ChainError> {
        Ok(self.resolve(packet)?.original)
    }

    /// Grouping key of the verified root
    pub fn grouping_key(&self, packet: &SignedPacket) -> Result<GroupingKey, ChainError> {
        Ok(self.resolve(packet)?.grouping_key())
    }

    /// Whether `key` signed any hop of `packet`.
    ///
    /// Only the hops within the depth guard are inspected.
    pub fn involves_identity(&self, packet: &SignedPacket, key: &PublicKey) -> bool {
        self.hops(packet).any(|hop| hop.source().public_key == *key)
    }

    /// Relay locations from the outermost hop inward
    pub fn position_chain(&self, packet: &SignedPacket) -> Vec<Location> {
        self.hops(packet)
            .filter_map(|hop| hop.packet.location())
            .collect()
    }
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::from_config(&TrustConfig::default())
    }
}
