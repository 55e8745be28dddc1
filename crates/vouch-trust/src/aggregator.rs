//! Confidence aggregation
//!
//! Arrivals sharing a root broadcast are collected into one group per
//! grouping key. A group debounces: every new distinct member pushes its
//! deadline out by the aggregation window. At the deadline the group is
//! scored against the sensing registry and either accepted, scheduled for a
//! retry while some unsensed member could still be corroborated, or dropped.
//! A member stops being retryable once its claimed timestamp falls out of the
//! sensing window, since no later sensing can match it.
//!
//! # Scoring
//!
//! A member is confirmed when this node sensed its immediate signer within
//! the sensing window of the member's claimed timestamp. A confirmed member
//! at depth `d` contributes `1 / 2^(d - 1)`, so a sensed root counts 1.0 and
//! a sensed first-hop relay 0.5.
//!
//! # States
//!
//! ```text
//! admit ──► Accumulating ──deadline──► score ──► Accepted
//!               ▲                        │
//!               │ new member             ├──► Retrying ──deadline──► score
//!               └────────── Retrying ◄───┘
//!                                        └──► Dropped
//! ```

use crate::guard::ProcessedIds;
use crate::registry::SensingRegistry;
use std::collections::BTreeMap;
use tracing::{debug, trace};
use vouch_core::{GroupingKey, PacketInformation, SignedPacket, Timestamp, TrustConfig};

/// Score of a group at evaluation time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confidence {
    /// Sum of depth-weighted contributions of confirmed members
    pub score: f64,
    /// Members whose signer was sensed within the window
    pub confirmations: u32,
    /// Members whose signer was not
    pub unsensed: u32,
    /// Unsensed members a sensing recorded from now on could still confirm
    pub pending: u32,
}

/// Contribution of a confirmed member at `depth`
pub fn depth_weight(depth: u32) -> f64 {
    let exponent = i32::try_from(depth.saturating_sub(1)).unwrap_or(i32::MAX);
    0.5f64.powi(exponent)
}

/// Score `members` against the registry as it is at `now`
pub fn calculate_confidence(
    members: &[PacketInformation],
    registry: &SensingRegistry,
    now: Timestamp,
) -> Confidence {
    let mut confidence = Confidence {
        score: 0.0,
        confirmations: 0,
        unsensed: 0,
        pending: 0,
    };

    for member in members {
        let source = member.packet.source();
        match registry.lookup(&source.public_key, source.timestamp) {
            Some(_) => {
                confidence.score += depth_weight(member.depth);
                confidence.confirmations += 1;
            }
            None => {
                confidence.unsensed += 1;
                if registry.can_still_corroborate(source.timestamp, now) {
                    confidence.pending += 1;
                }
            }
        }
    }
    confidence
}

/// Why a group was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The root expired before the group was accepted
    Expired,
    /// The root was accepted through another path
    AlreadyProcessed,
    /// The total fell short and no unsensed member can still be confirmed
    BelowThreshold,
    /// Some member could still be confirmed but retries ran out
    RetriesExhausted,
}

/// Result of admitting a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First member of a new group
    Opened,
    /// New distinct member of an existing group
    Joined,
    /// Same source or same signer as an existing member; ignored
    Duplicate,
}

/// A group that reached the confidence threshold
#[derive(Debug, Clone)]
pub struct AcceptedGroup {
    /// Root grouping key
    pub key: GroupingKey,
    /// Verified root broadcast
    pub original: SignedPacket,
    /// Every distinct member, in arrival order
    pub members: Vec<PacketInformation>,
    /// Final score
    pub confidence: Confidence,
}

/// Terminal or intermediate result of evaluating a due group
#[derive(Debug, Clone)]
pub enum GroupOutcome {
    /// Reached the threshold
    Accepted(AcceptedGroup),
    /// Fell short with pending members; re-evaluated at `deadline`
    Retrying {
        /// Root grouping key
        key: GroupingKey,
        /// Retry number, starting at 1
        attempt: u32,
        /// Next evaluation time
        deadline: Timestamp,
        /// Score that fell short
        confidence: Confidence,
    },
    /// Discarded
    Dropped {
        /// Root grouping key
        key: GroupingKey,
        /// Why
        reason: DropReason,
        /// Score, when the group was scored at all
        confidence: Option<Confidence>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Accumulating,
    Retrying,
}

#[derive(Debug, Clone)]
struct Group {
    original: SignedPacket,
    members: Vec<PacketInformation>,
    phase: Phase,
    attempts: u32,
    deadline: Timestamp,
}

impl Group {
    fn has_duplicate_of(&self, info: &PacketInformation) -> bool {
        let source = info.packet.source();
        self.members.iter().any(|member| {
            let existing = member.packet.source();
            existing == source || existing.public_key == source.public_key
        })
    }
}

/// Per-root groups awaiting a decision
#[derive(Debug, Clone)]
pub struct ConfidenceAggregator {
    groups: BTreeMap<GroupingKey, Group>,
    window_ms: u64,
    retry_delay_ms: u64,
    max_num_retries: u32,
    confidence_threshold: f64,
    expiration_ms: u64,
}

impl ConfidenceAggregator {
    /// Aggregator using the windows and limits of `config`
    pub fn from_config(config: &TrustConfig) -> Self {
        Self {
            groups: BTreeMap::new(),
            window_ms: config.aggregation_window_ms(),
            retry_delay_ms: config.retry_delay_ms,
            max_num_retries: config.max_num_retries,
            confidence_threshold: config.confidence_threshold,
            expiration_ms: config.packet_expiration_ms,
        }
    }

    /// Add a resolved arrival to its group
    pub fn admit(&mut self, info: PacketInformation, now: Timestamp) -> Admission {
        let key = info.grouping_key();
        let deadline = now.saturating_add(self.window_ms);

        let Some(group) = self.groups.get_mut(&key) else {
            trace!(%key, deadline, "Opened group");
            self.groups.insert(
                key,
                Group {
                    original: info.original.clone(),
                    members: vec![info],
                    phase: Phase::Accumulating,
                    attempts: 0,
                    deadline,
                },
            );
            return Admission::Opened;
        };

        if group.has_duplicate_of(&info) {
            trace!(%key, signer = %info.packet.source().public_key.short(), "Duplicate member");
            return Admission::Duplicate;
        }

        group.members.push(info);
        group.phase = Phase::Accumulating;
        group.deadline = deadline;
        trace!(%key, members = group.members.len(), deadline, "Member joined group");
        Admission::Joined
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.groups.values().map(|group| group.deadline).min()
    }

    /// Keys whose deadline has passed, earliest first
    pub fn due(&self, now: Timestamp) -> Vec<GroupingKey> {
        let mut due: Vec<_> = self
            .groups
            .iter()
            .filter(|(_, group)| group.deadline <= now)
            .map(|(key, group)| (group.deadline, key.clone()))
            .collect();
        due.sort();
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Evaluate every due group.
    ///
    /// Accepted groups are returned but not marked processed; the caller owns
    /// the processed set.
    pub fn finalize_due(
        &mut self,
        now: Timestamp,
        registry: &SensingRegistry,
        processed: &ProcessedIds,
    ) -> Vec<GroupOutcome> {
        self.due(now)
            .into_iter()
            .filter_map(|key| {
                let group = self.groups.remove(&key)?;
                Some(self.evaluate(key, group, now, registry, processed))
            })
            .collect()
    }

    fn evaluate(
        &mut self,
        key: GroupingKey,
        mut group: Group,
        now: Timestamp,
        registry: &SensingRegistry,
        processed: &ProcessedIds,
    ) -> GroupOutcome {
        if group.original.source().age_at(now) > self.expiration_ms {
            return GroupOutcome::Dropped {
                key,
                reason: DropReason::Expired,
                confidence: None,
            };
        }
        if processed.contains(&key) {
            return GroupOutcome::Dropped {
                key,
                reason: DropReason::AlreadyProcessed,
                confidence: None,
            };
        }

        let confidence = calculate_confidence(&group.members, registry, now);
        debug!(
            %key,
            score = confidence.score,
            confirmations = confidence.confirmations,
            unsensed = confidence.unsensed,
            pending = confidence.pending,
            phase = ?group.phase,
            "Scored group"
        );

        if confidence.score >= self.confidence_threshold {
            return GroupOutcome::Accepted(AcceptedGroup {
                key,
                original: group.original,
                members: group.members,
                confidence,
            });
        }

        if confidence.pending == 0 {
            return GroupOutcome::Dropped {
                key,
                reason: DropReason::BelowThreshold,
                confidence: Some(confidence),
            };
        }
        if group.attempts >= self.max_num_retries {
            return GroupOutcome::Dropped {
                key,
                reason: DropReason::RetriesExhausted,
                confidence: Some(confidence),
            };
        }

        group.attempts += 1;
        group.phase = Phase::Retrying;
        group.deadline = now.saturating_add(self.retry_delay_ms);
        let outcome = GroupOutcome::Retrying {
            key: key.clone(),
            attempt: group.attempts,
            deadline: group.deadline,
            confidence,
        };
        self.groups.insert(key, group);
        outcome
    }

    /// Number of open groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no group is open
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether a group for `key` is open
    pub fn contains(&self, key: &GroupingKey) -> bool {
        self.groups.contains_key(key)
    }
}
