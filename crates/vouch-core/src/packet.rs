//! Packet data model
//!
//! A packet is either an original `Broadcast` or a `Rebroadcast` that wraps
//! the signed packet it relays. Rebroadcasts nest, so a packet received after
//! `k` relays embeds the full chain back to its root broadcast.

use crate::identity::{PacketSignature, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wall-clock milliseconds since the UNIX epoch
pub type Timestamp = u64;

/// Who signed a packet, and when.
///
/// Created once per signed packet and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketSource {
    /// Unique packet identifier
    pub id: Uuid,
    /// Creation time claimed by the signer
    pub timestamp: Timestamp,
    /// Key of the packet's immediate signer
    pub public_key: PublicKey,
}

impl PacketSource {
    /// Fresh source with a random id
    pub fn new(public_key: PublicKey, timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            public_key,
        }
    }

    /// Age of the packet at `now`, zero for timestamps in the future
    pub fn age_at(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Where a relayer saw the broadcaster, relative to its own camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    /// Left of the field of view
    Left,
    /// Center of the field of view
    Center,
    /// Right of the field of view
    Right,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Location::Left => "LEFT",
            Location::Center => "CENTER",
            Location::Right => "RIGHT",
        };
        f.write_str(name)
    }
}

/// Payload of an original broadcast, handed to actuation once accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// Move according to an opaque command string
    Movement {
        /// Encoded movement command
        command: String,
    },
    /// Stop all movement
    Stop,
}

/// Unsigned packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    /// Original assertion by its signer
    Broadcast {
        /// Signer of the broadcast
        source: PacketSource,
        /// Event to act upon
        event: BroadcastEvent,
    },
    /// Attestation that `source` received `original` and saw its signer at
    /// `location`
    Rebroadcast {
        /// The relayer, not the root broadcaster
        source: PacketSource,
        /// Where the relayer sensed the wrapped packet's signer
        location: Location,
        /// The packet being relayed
        original: Box<SignedPacket>,
    },
}

impl Packet {
    /// Source of this hop
    pub fn source(&self) -> &PacketSource {
        match self {
            Packet::Broadcast { source, .. } | Packet::Rebroadcast { source, .. } => source,
        }
    }

    /// Whether this is a root broadcast
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Packet::Broadcast { .. })
    }

    /// The wrapped packet, for rebroadcasts
    pub fn inner(&self) -> Option<&SignedPacket> {
        match self {
            Packet::Broadcast { .. } => None,
            Packet::Rebroadcast { original, .. } => Some(original),
        }
    }

    /// Relay location, for rebroadcasts
    pub fn location(&self) -> Option<Location> {
        match self {
            Packet::Broadcast { .. } => None,
            Packet::Rebroadcast { location, .. } => Some(*location),
        }
    }

    /// Broadcast payload, for root broadcasts
    pub fn event(&self) -> Option<&BroadcastEvent> {
        match self {
            Packet::Broadcast { event, .. } => Some(event),
            Packet::Rebroadcast { .. } => None,
        }
    }
}

/// Packet plus the signature of its immediate signer.
///
/// The signature covers the canonical bytes of `packet` and must verify
/// against `packet.source().public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPacket {
    /// Signed content
    pub packet: Packet,
    /// Signature over the canonical encoding of `packet`
    pub signature: PacketSignature,
}

impl SignedPacket {
    /// Source of the outermost hop
    pub fn source(&self) -> &PacketSource {
        self.packet.source()
    }

    /// Whether this is a root broadcast
    pub fn is_broadcast(&self) -> bool {
        self.packet.is_broadcast()
    }
}

/// Key correlating a root broadcast with every rebroadcast of it.
///
/// Derived from the root broadcast's source, so arrival order does not
/// matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupingKey(PacketSource);

impl GroupingKey {
    /// Key for a root source
    pub fn from_source(source: &PacketSource) -> Self {
        Self(source.clone())
    }

    /// The root source
    pub fn source(&self) -> &PacketSource {
        &self.0
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broadcast-{}", self.0.id)
    }
}

/// Resolved view of an arrival, computed once and never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketInformation {
    /// Hops from the root; the root broadcast itself has depth 1
    pub depth: u32,
    /// Verified root broadcast
    pub original: SignedPacket,
    /// The packet as received
    pub packet: SignedPacket,
}

impl PacketInformation {
    /// Grouping key of the root
    pub fn grouping_key(&self) -> GroupingKey {
        GroupingKey::from_source(self.original.source())
    }
}
