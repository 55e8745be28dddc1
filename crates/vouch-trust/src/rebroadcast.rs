//! Rebroadcast decision
//!
//! A node vouches for a packet by relaying it when it physically sensed the
//! packet's immediate signer around the time the packet claims. The relay
//! wraps the received packet, records where the signer was seen and is
//! signed by this node. Relaying does not depend on the root being accepted.

use crate::guard::RelayedSources;
use crate::registry::SensingRegistry;
use tracing::{debug, info};
use vouch_core::{NodeIdentity, Packet, PacketSource, PublicKey, Result, SignedPacket, Timestamp};

/// Outcome of considering a packet for relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecision {
    /// Publish this signed rebroadcast
    Relay(SignedPacket),
    /// The immediate signer was not sensed near the claimed time
    NotSensed,
    /// This inbound packet was relayed before
    AlreadyRelayed,
}

/// Builds and signs rebroadcasts on behalf of this node
#[derive(Debug)]
pub struct Rebroadcaster {
    identity: NodeIdentity,
}

impl Rebroadcaster {
    /// Relay as `identity`
    pub fn new(identity: NodeIdentity) -> Self {
        Self { identity }
    }

    /// Key this node signs with
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Sign a packet of this node's own
    pub fn sign(&self, packet: Packet) -> Result<SignedPacket> {
        SignedPacket::sign(packet, &self.identity)
    }

    /// Decide whether to relay `packet`, marking its source relayed if so
    pub fn decide(
        &self,
        packet: &SignedPacket,
        registry: &SensingRegistry,
        relayed: &mut RelayedSources,
        now: Timestamp,
    ) -> Result<RelayDecision> {
        let source = packet.source();
        if registry.lookup(&source.public_key, source.timestamp).is_none() {
            return Ok(RelayDecision::NotSensed);
        }
        let Some(location) = registry.location_of(&source.public_key) else {
            return Ok(RelayDecision::NotSensed);
        };
        if relayed.contains(source) {
            debug!(source = %source.id, "Already relayed packet");
            return Ok(RelayDecision::AlreadyRelayed);
        }

        let rebroadcast = self.sign(Packet::Rebroadcast {
            source: PacketSource::new(self.public_key(), now),
            location,
            original: Box::new(packet.clone()),
        })?;
        relayed.check_and_mark(source);

        info!(
            signer = %source.public_key.short(),
            %location,
            "Relaying sensed packet"
        );
        Ok(RelayDecision::Relay(rebroadcast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ChainResolver;
    use assert_matches::assert_matches;
    use vouch_core::{BroadcastEvent, Location};

    fn identity(seed: u8) -> NodeIdentity {
        NodeIdentity::from_seed(&[seed; 32])
    }

    fn root(signer: &NodeIdentity, timestamp: Timestamp) -> SignedPacket {
        let packet = Packet::Broadcast {
            source: PacketSource::new(signer.public_key(), timestamp),
            event: BroadcastEvent::Movement {
                command: "forward".into(),
            },
        };
        SignedPacket::sign(packet, signer).unwrap()
    }

    #[test]
    fn test_sensed_signer_is_relayed_once() {
        let rebroadcaster = Rebroadcaster::new(identity(0));
        let broadcaster = identity(1);
        let packet = root(&broadcaster, 10_000);
        let mut registry = SensingRegistry::new(5_000);
        registry.record_sensing(broadcaster.public_key(), Location::Left, 12_000);
        let mut relayed = RelayedSources::new();

        let decision = rebroadcaster
            .decide(&packet, &registry, &mut relayed, 12_500)
            .unwrap();
        let RelayDecision::Relay(rebroadcast) = decision else {
            panic!("expected relay, got {decision:?}");
        };

        assert!(rebroadcast.verify_own());
        assert_eq!(rebroadcast.source().public_key, identity(0).public_key());
        assert_eq!(rebroadcast.source().timestamp, 12_500);
        assert_eq!(rebroadcast.packet.location(), Some(Location::Left));
        assert_eq!(rebroadcast.packet.inner(), Some(&packet));
        assert_eq!(
            ChainResolver::default().resolve(&rebroadcast).unwrap().depth,
            2
        );

        assert_eq!(
            rebroadcaster
                .decide(&packet, &registry, &mut relayed, 12_600)
                .unwrap(),
            RelayDecision::AlreadyRelayed
        );
    }

    #[test]
    fn test_unsensed_or_stale_signer_not_relayed() {
        let rebroadcaster = Rebroadcaster::new(identity(0));
        let broadcaster = identity(1);
        let packet = root(&broadcaster, 10_000);
        let mut registry = SensingRegistry::new(5_000);
        let mut relayed = RelayedSources::new();

        assert_matches!(
            rebroadcaster.decide(&packet, &registry, &mut relayed, 10_000),
            Ok(RelayDecision::NotSensed)
        );

        registry.record_sensing(broadcaster.public_key(), Location::Left, 20_000);
        assert_matches!(
            rebroadcaster.decide(&packet, &registry, &mut relayed, 20_000),
            Ok(RelayDecision::NotSensed)
        );
        assert!(relayed.is_empty());
    }

    #[test]
    fn test_relay_vouches_for_immediate_signer_only() {
        let rebroadcaster = Rebroadcaster::new(identity(0));
        let broadcaster = identity(1);
        let relay = identity(2);
        let inner = root(&broadcaster, 10_000);
        let packet = SignedPacket::sign(
            Packet::Rebroadcast {
                source: PacketSource::new(relay.public_key(), 10_100),
                location: Location::Right,
                original: Box::new(inner),
            },
            &relay,
        )
        .unwrap();

        let mut registry = SensingRegistry::new(5_000);
        registry.record_sensing(broadcaster.public_key(), Location::Left, 10_000);
        let mut relayed = RelayedSources::new();
        assert_matches!(
            rebroadcaster.decide(&packet, &registry, &mut relayed, 10_200),
            Ok(RelayDecision::NotSensed)
        );

        registry.record_sensing(relay.public_key(), Location::Center, 10_150);
        let decision = rebroadcaster
            .decide(&packet, &registry, &mut relayed, 10_200)
            .unwrap();
        assert_matches!(
            decision,
            RelayDecision::Relay(rebroadcast)
                if rebroadcast.packet.location() == Some(Location::Center)
        );
    }
}
