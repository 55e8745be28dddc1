//! Effect interfaces
//!
//! The pipeline itself is pure; everything that touches the outside world
//! goes through these traits so tests can swap in in-memory versions.
//!
//! - [`PacketTransport`]: publish signed packets to peers
//! - [`ActuationSink`]: hand accepted broadcasts to the actuator
//! - [`KeyProvider`]: load this node's identity at startup

pub mod actuation;
pub mod keys;
pub mod transport;

pub use actuation::{ActuationSink, ChannelSink};
pub use keys::{
    write_key_files, FileKeyProvider, KeyProvider, StaticKeyProvider, ENV_PRIVATE_KEY_LOCATION,
    ENV_PUBLIC_KEY_LOCATION,
};
pub use transport::{MemoryTransport, PacketTransport};
