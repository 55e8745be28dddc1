//! # Vouch Trust
//!
//! Decides whether a broadcast packet is trustworthy enough to act upon.
//!
//! A node accepts a root broadcast once enough of its arrivals (the root
//! itself and rebroadcasts of it) were signed by peers this node physically
//! sensed around the claimed time. Relays count less the further they are
//! from the root. Sensed packets are relayed in turn, carrying this node's
//! own attestation.
//!
//! - [`resolver`]: walks and verifies rebroadcast chains
//! - [`registry`]: last sensing of each peer
//! - [`guard`]: expiration, self and processed filters
//! - [`aggregator`]: per-root grouping, scoring and retries
//! - [`rebroadcast`]: relay decision
//! - [`pipeline`]: the synchronous state machine tying them together
//! - [`effects`] and [`runtime`]: I/O boundaries and the async driver

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod effects;
pub mod guard;
pub mod pipeline;
pub mod rebroadcast;
pub mod registry;
pub mod resolver;
pub mod runtime;

pub use aggregator::{
    calculate_confidence, depth_weight, Admission, Confidence, ConfidenceAggregator, DropReason,
    GroupOutcome,
};
pub use effects::{
    ActuationSink, ChannelSink, FileKeyProvider, KeyProvider, MemoryTransport, PacketTransport,
    StaticKeyProvider,
};
pub use guard::{PacketGuard, ProcessedIds, Rejection, RelayedSources};
pub use pipeline::{AcceptedPacket, EffectCommand, PipelineStats, TrustPipeline};
pub use rebroadcast::{Rebroadcaster, RelayDecision};
pub use registry::{SensingEvent, SensingRecord, SensingRegistry};
pub use resolver::{ChainError, ChainResolver};
pub use runtime::NodeRuntime;
