//! Sensing registry
//!
//! Records the last time and place this node physically sensed each peer
//! (for example by scanning its visual marker). A claimed packet timestamp is
//! only corroborated when it falls within `sensing_threshold_ms` of the last
//! sensing, in either direction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use vouch_core::{Location, PublicKey, Result, Timestamp, TrustConfig};

/// Last sensing of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensingRecord {
    /// Where the peer was seen
    pub location: Location,
    /// When the peer was seen
    pub sensed_at: Timestamp,
}

/// Sensing as reported by the sensor: a scanned identity and where it was.
///
/// The identity is the raw scanned text and may carry line breaks or padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensingEvent {
    /// Scanned public key, hex encoded
    pub identity: String,
    /// Position relative to the sensor
    pub location: Location,
}

impl SensingEvent {
    /// Event for an already decoded key
    pub fn new(identity: PublicKey, location: Location) -> Self {
        Self {
            identity: identity.to_hex(),
            location,
        }
    }

    /// Normalized public key of the scanned identity
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_scanned(&self.identity)
    }
}

/// Map from peer identity to its most recent sensing
#[derive(Debug, Clone)]
pub struct SensingRegistry {
    entries: HashMap<PublicKey, SensingRecord>,
    threshold_ms: u64,
}

impl SensingRegistry {
    /// Empty registry with the given corroboration window
    pub fn new(threshold_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            threshold_ms,
        }
    }

    /// Empty registry using `config.sensing_threshold_ms`
    pub fn from_config(config: &TrustConfig) -> Self {
        Self::new(config.sensing_threshold_ms)
    }

    /// Record a sensing, replacing any earlier one for the same identity
    pub fn record_sensing(&mut self, identity: PublicKey, location: Location, now: Timestamp) {
        let previous = self.entries.insert(
            identity,
            SensingRecord {
                location,
                sensed_at: now,
            },
        );
        if previous.is_none() {
            info!(peer = %identity.short(), %location, "Sensed new peer");
        } else {
            debug!(peer = %identity.short(), %location, "Refreshed peer sensing");
        }
    }

    /// Normalize and record a raw sensing event
    pub fn record_event(&mut self, event: &SensingEvent, now: Timestamp) -> Result<PublicKey> {
        let identity = event.public_key()?;
        self.record_sensing(identity, event.location, now);
        Ok(identity)
    }

    /// The sensing that corroborates `claimed`, if any
    pub fn lookup(&self, identity: &PublicKey, claimed: Timestamp) -> Option<SensingRecord> {
        let record = self.entries.get(identity)?;
        (record.sensed_at.abs_diff(claimed) <= self.threshold_ms).then_some(*record)
    }

    /// Whether a sensing recorded at `now` or later could still corroborate a
    /// claim made at `claimed`
    pub fn can_still_corroborate(&self, claimed: Timestamp, now: Timestamp) -> bool {
        now <= claimed.saturating_add(self.threshold_ms)
    }

    /// Last known location of `identity`, regardless of age
    pub fn location_of(&self, identity: &PublicKey) -> Option<Location> {
        self.entries.get(identity).map(|record| record.location)
    }

    /// Corroboration window
    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// Number of identities ever sensed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been sensed yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
