//! Ambient tuning knobs for header sync and misbehavior scoring. Every
//! number here is safe to vary between nodes without a network split,
//! unlike [`crate::consensus::ConsensusParams`].

use std::time::Duration;

use primitive_types::U256;

/// Misbehavior points awarded per spec §4.7. A score reaching
/// [`HeaderSyncConfig::ban_threshold`] disconnects and discourages the peer.
#[derive(Debug, Clone, Copy)]
pub struct MisbehaviorPoints {
    pub oversized_message: u32,
    pub non_continuous_headers: u32,
    pub invalid_pow: u32,
    pub too_many_orphans: u32,
    pub too_many_unconnecting: u32,
    pub low_work_headers: u32,
}

impl Default for MisbehaviorPoints {
    fn default() -> Self {
        Self {
            oversized_message: 20,
            non_continuous_headers: 20,
            invalid_pow: 100,
            too_many_orphans: 100,
            too_many_unconnecting: 100,
            low_work_headers: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaderSyncConfig {
    /// Max headers accepted in a single `headers` message (spec §6.5).
    pub max_headers_per_message: usize,
    /// Misbehavior point values (spec §4.7).
    pub points: MisbehaviorPoints,
    /// Score at or above which a peer is disconnected and discouraged.
    pub ban_threshold: u32,
    /// How long a banned peer is discouraged for.
    pub discouragement_period: Duration,
    /// `unconnecting_headers_count` threshold that triggers
    /// `too_many_unconnecting` (spec §4.7).
    pub unconnecting_limit: u32,
    /// Amount `unconnecting_headers_count` decays by (not resets) on every
    /// successful non-orphan accept.
    pub unconnecting_decay: u32,
    /// Below this accumulated difficulty, a non-initial-sync node treats an
    /// incoming batch as low-work spam (SPEC_FULL §2).
    pub minimum_chain_work: U256,
    /// Seconds of inactivity after a `getheaders` before the sync peer
    /// slot is cleared (spec §4.7).
    pub sync_peer_timeout: Duration,
}

impl Default for HeaderSyncConfig {
    fn default() -> Self {
        Self {
            max_headers_per_message: 2000,
            points: MisbehaviorPoints::default(),
            ban_threshold: 100,
            discouragement_period: Duration::from_secs(24 * 60 * 60),
            unconnecting_limit: 10,
            unconnecting_decay: 2,
            minimum_chain_work: U256::zero(),
            sync_peer_timeout: Duration::from_secs(60),
        }
    }
}
