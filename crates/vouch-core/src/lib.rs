//! # Vouch Core
//!
//! Foundation types for the Vouch trust pipeline:
//!
//! - [`packet`]: broadcast/rebroadcast packets, sources and grouping keys
//! - [`identity`]: Ed25519 public keys, signatures and the node key pair
//! - [`codec`]: canonical signing bytes and sign/verify primitives
//! - [`serialization`]: DAG-CBOR canonical form and JSON wire form
//! - [`config`]: pipeline tunables with file and environment overrides
//! - [`time`]: wall-clock sources
//! - [`errors`]: unified error type

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod errors;
pub mod identity;
pub mod packet;
pub mod serialization;
pub mod time;

pub use codec::{signing_bytes, PACKET_SIGNING_DOMAIN};
pub use config::TrustConfig;
pub use errors::{Result, VouchError};
pub use identity::{NodeIdentity, PacketSignature, PublicKey};
pub use packet::{
    BroadcastEvent, GroupingKey, Location, Packet, PacketInformation, PacketSource, SignedPacket,
    Timestamp,
};
pub use serialization::{decode_wire, encode_wire};
pub use time::{ManualClock, PhysicalClock, SystemClock};
