//! Shared fixtures for trust pipeline integration tests

#![allow(dead_code)]

use vouch_core::{
    BroadcastEvent, Location, NodeIdentity, Packet, PacketSource, SignedPacket, Timestamp,
    TrustConfig,
};
use vouch_trust::{EffectCommand, TrustPipeline};

/// Deterministic identity for `seed`
pub fn identity(seed: u8) -> NodeIdentity {
    NodeIdentity::from_seed(&[seed; 32])
}

/// Signed root broadcast
pub fn broadcast(signer: &NodeIdentity, timestamp: Timestamp) -> SignedPacket {
    let packet = Packet::Broadcast {
        source: PacketSource::new(signer.public_key(), timestamp),
        event: BroadcastEvent::Movement {
            command: "forward".into(),
        },
    };
    SignedPacket::sign(packet, signer).unwrap()
}

/// Signed rebroadcast of `inner`
pub fn rebroadcast(
    inner: &SignedPacket,
    signer: &NodeIdentity,
    location: Location,
    timestamp: Timestamp,
) -> SignedPacket {
    let packet = Packet::Rebroadcast {
        source: PacketSource::new(signer.public_key(), timestamp),
        location,
        original: Box::new(inner.clone()),
    };
    SignedPacket::sign(packet, signer).unwrap()
}

/// Windows used by scenario tests: 1s debounce, 500ms retries, 60s sensing
pub fn scenario_config() -> TrustConfig {
    TrustConfig {
        packet_expiration_ms: 5 * 60 * 1000,
        sensing_threshold_ms: 60_000,
        aggregation_window_ms: Some(1_000),
        retry_delay_ms: 500,
        max_num_retries: 3,
        ..Default::default()
    }
}

/// Pipeline for the local node (seed 0)
pub fn local_pipeline() -> TrustPipeline {
    TrustPipeline::new(identity(0), scenario_config()).unwrap()
}

/// Tick at each deadline until no group is open, collecting every effect
pub fn drain(pipeline: &mut TrustPipeline) -> Vec<EffectCommand> {
    let mut effects = Vec::new();
    while let Some(deadline) = pipeline.next_deadline() {
        effects.extend(pipeline.tick(deadline));
    }
    effects
}

/// Deliveries among `effects`
pub fn deliveries(effects: &[EffectCommand]) -> Vec<&vouch_trust::AcceptedPacket> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            EffectCommand::Deliver { accepted } => Some(accepted),
            EffectCommand::Publish { .. } => None,
        })
        .collect()
}

/// Published packets among `effects`
pub fn published(effects: &[EffectCommand]) -> Vec<&SignedPacket> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            EffectCommand::Publish { packet } => Some(packet),
            EffectCommand::Deliver { .. } => None,
        })
        .collect()
}
