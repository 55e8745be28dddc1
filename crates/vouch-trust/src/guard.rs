//! Dedup and expiration guard
//!
//! Cheap checks applied to every inbound packet before any signature work:
//! expiration, self-involvement and already-processed roots. The same
//! processed check is repeated once the chain has been resolved, since only
//! then is the root's grouping key known.

use crate::resolver::{ChainError, ChainResolver};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;
use vouch_core::{
    GroupingKey, PacketInformation, PacketSource, PublicKey, SignedPacket, Timestamp,
    TrustConfig,
};

/// Why an inbound packet was not admitted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Older than the packet expiration
    #[error("packet expired ({age_ms}ms old)")]
    Expired {
        /// Age of the packet when checked
        age_ms: u64,
    },
    /// This node signed one of the hops
    #[error("packet chain involves this node")]
    SelfInvolved,
    /// The root was already accepted
    #[error("{key} already processed")]
    AlreadyProcessed {
        /// Grouping key that matched
        key: GroupingKey,
    },
    /// The chain failed resolution
    #[error("invalid chain: {0}")]
    InvalidChain(#[from] ChainError),
}

/// Grouping keys of accepted roots.
///
/// Entries are never evicted; an evicted key could be accepted twice.
#[derive(Debug, Default, Clone)]
pub struct ProcessedIds {
    keys: HashSet<GroupingKey>,
}

impl ProcessedIds {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as processed.
    ///
    /// Returns true if this is the first time the key is marked.
    pub fn check_and_mark(&mut self, key: &GroupingKey) -> bool {
        self.keys.insert(key.clone())
    }

    /// Whether `key` was processed
    pub fn contains(&self, key: &GroupingKey) -> bool {
        self.keys.contains(key)
    }

    /// Number of processed roots
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing was processed yet
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Inbound sources this node already relayed
#[derive(Debug, Default, Clone)]
pub struct RelayedSources {
    sources: HashSet<PacketSource>,
}

impl RelayedSources {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `source` as relayed.
    ///
    /// Returns true if it had not been relayed before.
    pub fn check_and_mark(&mut self, source: &PacketSource) -> bool {
        self.sources.insert(source.clone())
    }

    /// Whether `source` was relayed
    pub fn contains(&self, source: &PacketSource) -> bool {
        self.sources.contains(source)
    }

    /// Forget sources older than `expiration_ms`.
    ///
    /// Packets carrying them are rejected as expired before reaching the
    /// relay decision.
    pub fn prune_expired(&mut self, now: Timestamp, expiration_ms: u64) -> usize {
        let before = self.sources.len();
        self.sources.retain(|source| source.age_at(now) <= expiration_ms);
        let pruned = before - self.sources.len();
        if pruned > 0 {
            debug!(pruned, "Pruned expired relayed sources");
        }
        pruned
    }

    /// Number of tracked sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing was relayed yet
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Inbound packet filter for one node
#[derive(Debug, Clone)]
pub struct PacketGuard {
    own_key: PublicKey,
    expiration_ms: u64,
}

impl PacketGuard {
    /// Guard for the node holding `own_key`
    pub fn new(own_key: PublicKey, expiration_ms: u64) -> Self {
        Self {
            own_key,
            expiration_ms,
        }
    }

    /// Guard using `config.packet_expiration_ms`
    pub fn from_config(own_key: PublicKey, config: &TrustConfig) -> Self {
        Self::new(own_key, config.packet_expiration_ms)
    }

    /// Expiration applied to every source
    pub fn expiration_ms(&self) -> u64 {
        self.expiration_ms
    }

    /// Whether `source` is too old at `now`
    pub fn is_expired(&self, source: &PacketSource, now: Timestamp) -> bool {
        source.age_at(now) > self.expiration_ms
    }

    fn check_expired(&self, source: &PacketSource, now: Timestamp) -> Result<(), Rejection> {
        if self.is_expired(source, now) {
            return Err(Rejection::Expired {
                age_ms: source.age_at(now),
            });
        }
        Ok(())
    }

    /// Checks run before the chain is resolved, cheapest first
    pub fn check_arrival(
        &self,
        packet: &SignedPacket,
        resolver: &ChainResolver,
        processed: &ProcessedIds,
        now: Timestamp,
    ) -> Result<(), Rejection> {
        self.check_expired(packet.source(), now)?;

        if resolver.involves_identity(packet, &self.own_key) {
            return Err(Rejection::SelfInvolved);
        }

        // A root broadcast's own source is its grouping key; catches direct
        // re-deliveries without verifying anything.
        let key = GroupingKey::from_source(packet.source());
        if processed.contains(&key) {
            return Err(Rejection::AlreadyProcessed { key });
        }
        Ok(())
    }

    /// Checks run once the root is known
    pub fn check_resolved(
        &self,
        info: &PacketInformation,
        processed: &ProcessedIds,
        now: Timestamp,
    ) -> Result<(), Rejection> {
        self.check_expired(info.original.source(), now)?;

        let key = info.grouping_key();
        if processed.contains(&key) {
            return Err(Rejection::AlreadyProcessed { key });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use vouch_core::{BroadcastEvent, Location, NodeIdentity, Packet};

    const EXPIRATION: u64 = 60_000;

    fn identity(seed: u8) -> NodeIdentity {
        NodeIdentity::from_seed(&[seed; 32])
    }

    fn root_at(signer: &NodeIdentity, timestamp: Timestamp) -> SignedPacket {
        let packet = Packet::Broadcast {
            source: PacketSource::new(signer.public_key(), timestamp),
            event: BroadcastEvent::Stop,
        };
        SignedPacket::sign(packet, signer).unwrap()
    }

    fn relay_at(inner: SignedPacket, signer: &NodeIdentity, timestamp: Timestamp) -> SignedPacket {
        let packet = Packet::Rebroadcast {
            source: PacketSource::new(signer.public_key(), timestamp),
            location: Location::Center,
            original: Box::new(inner),
        };
        SignedPacket::sign(packet, signer).unwrap()
    }

    fn guard() -> PacketGuard {
        PacketGuard::new(identity(0).public_key(), EXPIRATION)
    }

    #[test]
    fn test_expiration_boundary() {
        let guard = guard();
        let resolver = ChainResolver::default();
        let processed = ProcessedIds::new();
        let packet = root_at(&identity(1), 100_000);

        assert!(guard
            .check_arrival(&packet, &resolver, &processed, 100_000 + EXPIRATION)
            .is_ok());
        assert_matches!(
            guard.check_arrival(&packet, &resolver, &processed, 100_001 + EXPIRATION),
            Err(Rejection::Expired { age_ms }) if age_ms == EXPIRATION + 1
        );
    }

    #[test]
    fn test_future_timestamps_are_not_expired() {
        let guard = guard();
        let packet = root_at(&identity(1), 500_000);
        assert!(!guard.is_expired(packet.source(), 0));
    }

    #[test]
    fn test_own_hop_rejected() {
        let guard = guard();
        let resolver = ChainResolver::default();
        let packet = relay_at(
            relay_at(root_at(&identity(1), 1_000), &identity(0), 1_100),
            &identity(2),
            1_200,
        );

        assert_matches!(
            guard.check_arrival(&packet, &resolver, &ProcessedIds::new(), 2_000),
            Err(Rejection::SelfInvolved)
        );
    }

    #[test]
    fn test_processed_root_rejected_before_and_after_resolution() {
        let guard = guard();
        let resolver = ChainResolver::default();
        let root = root_at(&identity(1), 1_000);
        let relayed = relay_at(root.clone(), &identity(2), 1_100);

        let mut processed = ProcessedIds::new();
        assert!(processed.check_and_mark(&GroupingKey::from_source(root.source())));

        assert_matches!(
            guard.check_arrival(&root, &resolver, &processed, 2_000),
            Err(Rejection::AlreadyProcessed { .. })
        );

        // The relay's own source is not a processed key.
        assert!(guard
            .check_arrival(&relayed, &resolver, &processed, 2_000)
            .is_ok());
        let info = resolver.resolve(&relayed).unwrap();
        assert_matches!(
            guard.check_resolved(&info, &processed, 2_000),
            Err(Rejection::AlreadyProcessed { key }) if key == info.grouping_key()
        );
    }

    #[test]
    fn test_expired_root_inside_fresh_relay_rejected_after_resolution() {
        let guard = guard();
        let resolver = ChainResolver::default();
        let relayed = relay_at(root_at(&identity(1), 1_000), &identity(2), 100_000);
        let processed = ProcessedIds::new();

        assert!(guard
            .check_arrival(&relayed, &resolver, &processed, 100_000)
            .is_ok());
        let info = resolver.resolve(&relayed).unwrap();
        assert_matches!(
            guard.check_resolved(&info, &processed, 100_000),
            Err(Rejection::Expired { .. })
        );
    }

    #[test]
    fn test_processed_ids_mark_once() {
        let mut processed = ProcessedIds::new();
        let key = GroupingKey::from_source(&PacketSource::new(identity(1).public_key(), 1));

        assert!(processed.check_and_mark(&key));
        assert!(!processed.check_and_mark(&key));
        assert_eq!(processed.len(), 1);
    }

    #[test]
    fn test_relayed_sources_prune_by_age() {
        let mut relayed = RelayedSources::new();
        let old = PacketSource::new(identity(1).public_key(), 1_000);
        let fresh = PacketSource::new(identity(2).public_key(), 90_000);
        assert!(relayed.check_and_mark(&old));
        assert!(relayed.check_and_mark(&fresh));
        assert!(!relayed.check_and_mark(&fresh));

        assert_eq!(relayed.prune_expired(100_000, EXPIRATION), 1);
        assert!(!relayed.contains(&old));
        assert!(relayed.contains(&fresh));
    }
}
