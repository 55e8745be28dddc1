//! Trust pipeline
//!
//! `TrustPipeline` is the synchronous core of a node. It owns every piece of
//! mutable state (registry, processed and relayed sets, open groups) and
//! never performs I/O or reads the clock: each operation takes `now` and
//! returns the effects the caller must carry out.
//!
//! ```text
//! wire bytes ─► decode ─► guard ─► resolve ─► relay? ─► processed? ─► admit
//!                                               │                       │
//!                                          Publish                 tick(now)
//!                                                                       │
//!                                                                   Deliver
//! ```

use crate::aggregator::{
    AcceptedGroup, Admission, Confidence, ConfidenceAggregator, DropReason, GroupOutcome,
};
use crate::guard::{PacketGuard, ProcessedIds, RelayedSources, Rejection};
use crate::rebroadcast::{Rebroadcaster, RelayDecision};
use crate::registry::{SensingEvent, SensingRegistry};
use crate::resolver::ChainResolver;
use tracing::{debug, info, warn};
use vouch_core::{
    decode_wire, BroadcastEvent, GroupingKey, Location, NodeIdentity, Packet,
    PacketInformation, PacketSource, PublicKey, Result, SignedPacket, Timestamp, TrustConfig,
};

/// A root broadcast the node decided to act upon
#[derive(Debug, Clone)]
pub struct AcceptedPacket {
    /// Root grouping key
    pub key: GroupingKey,
    /// Verified root broadcast
    pub original: SignedPacket,
    /// Score at acceptance
    pub confidence: Confidence,
    /// Every distinct member that contributed, in arrival order
    pub members: Vec<PacketInformation>,
    /// Relay locations of each member, outermost hop first
    pub position_chains: Vec<Vec<Location>>,
}

impl AcceptedPacket {
    /// Event carried by the root broadcast
    pub fn event(&self) -> Option<&BroadcastEvent> {
        self.original.packet.event()
    }

    /// Node that originated the broadcast
    pub fn broadcaster(&self) -> PublicKey {
        self.original.source().public_key
    }
}

/// Side effect requested by the pipeline
#[derive(Debug, Clone)]
pub enum EffectCommand {
    /// Send a signed packet to every peer
    Publish {
        /// Packet to send
        packet: SignedPacket,
    },
    /// Hand an accepted broadcast to actuation
    Deliver {
        /// What was accepted
        accepted: AcceptedPacket,
    },
}

/// Running counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Packets offered to the pipeline, including malformed ones
    pub received: u64,
    /// Wire payloads that failed to decode
    pub malformed: u64,
    /// Rejected as expired
    pub expired: u64,
    /// Rejected because this node signed a hop
    pub self_involved: u64,
    /// Rejected because the root was already accepted
    pub already_processed: u64,
    /// Rejected by chain resolution
    pub invalid_chain: u64,
    /// Ignored as a duplicate group member
    pub duplicates: u64,
    /// Rebroadcasts published
    pub relayed: u64,
    /// Scheduled re-evaluations
    pub retried: u64,
    /// Roots accepted
    pub accepted: u64,
    /// Groups dropped
    pub dropped: u64,
    /// Sensing events recorded
    pub sensed: u64,
}

impl PipelineStats {
    fn record_rejection(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::Expired { .. } => self.expired += 1,
            Rejection::SelfInvolved => self.self_involved += 1,
            Rejection::AlreadyProcessed { .. } => self.already_processed += 1,
            Rejection::InvalidChain(_) => self.invalid_chain += 1,
        }
    }
}

/// The per-node trust state machine
#[derive(Debug)]
pub struct TrustPipeline {
    config: TrustConfig,
    resolver: ChainResolver,
    guard: PacketGuard,
    registry: SensingRegistry,
    processed: ProcessedIds,
    relayed: RelayedSources,
    aggregator: ConfidenceAggregator,
    rebroadcaster: Rebroadcaster,
    stats: PipelineStats,
}

impl TrustPipeline {
    /// Pipeline for `identity`, after validating `config`
    pub fn new(identity: NodeIdentity, config: TrustConfig) -> Result<Self> {
        config.validate()?;
        let own_key = identity.public_key();

        Ok(Self {
            resolver: ChainResolver::from_config(&config),
            guard: PacketGuard::from_config(own_key, &config),
            registry: SensingRegistry::from_config(&config),
            processed: ProcessedIds::new(),
            relayed: RelayedSources::new(),
            aggregator: ConfidenceAggregator::from_config(&config),
            rebroadcaster: Rebroadcaster::new(identity),
            stats: PipelineStats::default(),
            config,
        })
    }

    /// Decode a transport payload and handle it.
    ///
    /// Malformed payloads produce no effects.
    pub fn handle_wire(&mut self, bytes: &[u8], now: Timestamp) -> Vec<EffectCommand> {
        match decode_wire(bytes) {
            Ok(packet) => self.handle_packet(packet, now),
            Err(e) => {
                self.stats.received += 1;
                self.stats.malformed += 1;
                debug!(error = %e, len = bytes.len(), "Dropping malformed packet");
                Vec::new()
            }
        }
    }

    /// Run an inbound packet through the guard, resolution, relay decision and
    /// aggregation
    pub fn handle_packet(&mut self, packet: SignedPacket, now: Timestamp) -> Vec<EffectCommand> {
        self.stats.received += 1;
        let mut effects = Vec::new();

        let arrival = self
            .guard
            .check_arrival(&packet, &self.resolver, &self.processed, now);
        if let Err(rejection) = arrival {
            self.reject(&packet, rejection);
            return effects;
        }

        let info = match self.resolver.resolve(&packet) {
            Ok(info) => info,
            Err(e) => {
                self.reject(&packet, e.into());
                return effects;
            }
        };

        match self
            .rebroadcaster
            .decide(&packet, &self.registry, &mut self.relayed, now)
        {
            Ok(RelayDecision::Relay(rebroadcast)) => {
                self.stats.relayed += 1;
                effects.push(EffectCommand::Publish {
                    packet: rebroadcast,
                });
            }
            Ok(RelayDecision::NotSensed | RelayDecision::AlreadyRelayed) => {}
            Err(e) => warn!(error = %e, "Failed to sign rebroadcast"),
        }

        if let Err(rejection) = self.guard.check_resolved(&info, &self.processed, now) {
            self.reject(&packet, rejection);
            return effects;
        }

        let key = info.grouping_key();
        let depth = info.depth;
        match self.aggregator.admit(info, now) {
            Admission::Opened => debug!(%key, depth, "Opened group"),
            Admission::Joined => debug!(%key, depth, "Joined group"),
            Admission::Duplicate => {
                self.stats.duplicates += 1;
                debug!(%key, depth, "Ignoring duplicate member");
            }
        }
        effects
    }

    fn reject(&mut self, packet: &SignedPacket, rejection: Rejection) {
        self.stats.record_rejection(&rejection);
        let signer = packet.source().public_key.short();
        match &rejection {
            Rejection::InvalidChain(e) => {
                warn!(%signer, error = %e, "Rejected packet with invalid chain");
            }
            _ => debug!(%signer, reason = %rejection, "Rejected packet"),
        }
    }

    /// Record a raw sensing event. Malformed identities are an error.
    pub fn record_sensing(&mut self, event: &SensingEvent, now: Timestamp) -> Result<PublicKey> {
        let identity = self.registry.record_event(event, now)?;
        self.stats.sensed += 1;
        Ok(identity)
    }

    /// Record a sensing of an already decoded identity
    pub fn record_sensed(&mut self, identity: PublicKey, location: Location, now: Timestamp) {
        self.registry.record_sensing(identity, location, now);
        self.stats.sensed += 1;
    }

    /// Evaluate due groups and emit deliveries for accepted roots
    pub fn tick(&mut self, now: Timestamp) -> Vec<EffectCommand> {
        self.relayed.prune_expired(now, self.config.packet_expiration_ms);

        let outcomes = self
            .aggregator
            .finalize_due(now, &self.registry, &self.processed);

        let mut effects = Vec::new();
        for outcome in outcomes {
            match outcome {
                GroupOutcome::Accepted(group) => {
                    if let Some(accepted) = self.accept(group) {
                        effects.push(EffectCommand::Deliver { accepted });
                    }
                }
                GroupOutcome::Retrying {
                    key,
                    attempt,
                    deadline,
                    confidence,
                } => {
                    self.stats.retried += 1;
                    debug!(
                        %key,
                        attempt,
                        deadline,
                        score = confidence.score,
                        unsensed = confidence.unsensed,
                        pending = confidence.pending,
                        "Waiting for sensing before re-evaluating"
                    );
                }
                GroupOutcome::Dropped {
                    key,
                    reason,
                    confidence,
                } => {
                    self.stats.dropped += 1;
                    let score = confidence.map(|c| c.score);
                    match reason {
                        DropReason::BelowThreshold | DropReason::RetriesExhausted => {
                            info!(%key, ?reason, ?score, "Dropped unconfirmed broadcast");
                        }
                        DropReason::Expired | DropReason::AlreadyProcessed => {
                            debug!(%key, ?reason, "Dropped group");
                        }
                    }
                }
            }
        }
        effects
    }

    fn accept(&mut self, group: AcceptedGroup) -> Option<AcceptedPacket> {
        if !self.processed.check_and_mark(&group.key) {
            return None;
        }
        self.stats.accepted += 1;

        let position_chains = group
            .members
            .iter()
            .map(|member| self.resolver.position_chain(&member.packet))
            .collect();

        info!(
            key = %group.key,
            broadcaster = %group.original.source().public_key.short(),
            score = group.confidence.score,
            confirmations = group.confidence.confirmations,
            members = group.members.len(),
            "Accepted broadcast"
        );

        Some(AcceptedPacket {
            key: group.key,
            original: group.original,
            confidence: group.confidence,
            members: group.members,
            position_chains,
        })
    }

    /// Sign a broadcast originating at this node.
    ///
    /// The result is meant for the transport; it never enters this node's
    /// own aggregation.
    pub fn originate(&self, event: BroadcastEvent, now: Timestamp) -> Result<SignedPacket> {
        let packet = Packet::Broadcast {
            source: PacketSource::new(self.public_key(), now),
            event,
        };
        let signed = self.rebroadcaster.sign(packet)?;
        info!(id = %signed.source().id, "Originated broadcast");
        Ok(signed)
    }

    /// Earliest time `tick` has work to do
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.aggregator.next_deadline()
    }

    /// This node's key
    pub fn public_key(&self) -> PublicKey {
        self.rebroadcaster.public_key()
    }

    /// Effective configuration
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Sensing state
    pub fn registry(&self) -> &SensingRegistry {
        &self.registry
    }

    /// Accepted roots
    pub fn processed(&self) -> &ProcessedIds {
        &self.processed
    }

    /// Open groups
    pub fn aggregator(&self) -> &ConfidenceAggregator {
        &self.aggregator
    }

    /// Counters since creation
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}
