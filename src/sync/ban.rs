//! Misbehavior scoring and ban/discouragement decisions (spec §4.7).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::*;

use crate::common::PeerId;
use crate::sync::config::HeaderSyncConfig;
use crate::sync::peer_state::PeerSyncState;

const LOG_TARGET: &str = "chainbase::sync::ban";

/// Every distinct reason a peer's score can be bumped (spec §4.7). Each
/// variant carries no data of its own; the point value is looked up from
/// [`HeaderSyncConfig::points`] by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisbehaviorReason {
    OversizedMessage,
    NonContinuousHeaders,
    InvalidPow,
    TooManyOrphans,
    TooManyUnconnecting,
    LowWorkHeaders,
}

impl MisbehaviorReason {
    pub fn points(self, cfg: &HeaderSyncConfig) -> u32 {
        match self {
            MisbehaviorReason::OversizedMessage => cfg.points.oversized_message,
            MisbehaviorReason::NonContinuousHeaders => cfg.points.non_continuous_headers,
            MisbehaviorReason::InvalidPow => cfg.points.invalid_pow,
            MisbehaviorReason::TooManyOrphans => cfg.points.too_many_orphans,
            MisbehaviorReason::TooManyUnconnecting => cfg.points.too_many_unconnecting,
            MisbehaviorReason::LowWorkHeaders => cfg.points.low_work_headers,
        }
    }

    /// `invalid_pow` disconnects immediately regardless of the accumulated
    /// score (spec §4.7).
    pub fn is_immediate_disconnect(self) -> bool {
        matches!(self, MisbehaviorReason::InvalidPow)
    }
}

/// What the caller should do with the peer's transport connection after a
/// misbehavior report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanDecision {
    Continue,
    DisconnectAndDiscourage { discourage_for: Duration },
}

/// Tracks per-peer misbehavior state. Acquired strictly after the
/// chainstate lock when both are held (spec §5), so reporting a
/// misbehavior never blocks while holding the chain mutex.
pub struct PeerRegistry {
    config: HeaderSyncConfig,
    peers: Mutex<HashMap<PeerId, PeerSyncState>>,
}

impl PeerRegistry {
    pub fn new(config: HeaderSyncConfig) -> Self {
        Self { config, peers: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &HeaderSyncConfig {
        &self.config
    }

    fn with_peer<R>(&self, peer: PeerId, f: impl FnOnce(&mut PeerSyncState) -> R) -> R {
        let mut peers = self.peers.lock().expect("peer registry mutex poisoned");
        let state = peers.entry(peer).or_insert_with(PeerSyncState::new);
        f(state)
    }

    /// Records a misbehavior and returns the resulting decision.
    pub fn report(&self, peer: PeerId, reason: MisbehaviorReason) -> BanDecision {
        let points = reason.points(&self.config);
        let score = self.with_peer(peer, |s| s.add_score(points));
        debug!(target: LOG_TARGET, "{} misbehavior={:?} points={} score={}", peer, reason, points, score);

        if reason.is_immediate_disconnect() || score >= self.config.ban_threshold {
            warn!(target: LOG_TARGET, "{} crossed ban threshold (score={}), disconnecting", peer, score);
            self.forget(peer);
            BanDecision::DisconnectAndDiscourage { discourage_for: self.config.discouragement_period }
        } else {
            BanDecision::Continue
        }
    }

    pub fn score(&self, peer: PeerId) -> u32 {
        self.with_peer(peer, |s| s.misbehavior_score())
    }

    pub fn record_unconnecting(&self, peer: PeerId) -> u32 {
        self.with_peer(peer, |s| s.increment_unconnecting())
    }

    pub fn decay_unconnecting(&self, peer: PeerId) {
        let decay = self.config.unconnecting_decay;
        self.with_peer(peer, |s| s.decay_unconnecting(decay));
    }

    pub fn unconnecting_count(&self, peer: PeerId) -> u32 {
        self.with_peer(peer, |s| s.unconnecting_headers_count())
    }

    /// Drops all bookkeeping for a peer, e.g. after disconnect.
    pub fn forget(&self, peer: PeerId) {
        self.peers.lock().expect("peer registry mutex poisoned").remove(&peer);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accumulates_until_ban_threshold() {
        let registry = PeerRegistry::new(HeaderSyncConfig::default());
        let peer = PeerId::new(1);
        assert_eq!(registry.report(peer, MisbehaviorReason::OversizedMessage), BanDecision::Continue);
        assert_eq!(registry.report(peer, MisbehaviorReason::NonContinuousHeaders), BanDecision::Continue);
        assert_eq!(registry.score(peer), 40);
        let decision = registry.report(peer, MisbehaviorReason::TooManyOrphans);
        assert!(matches!(decision, BanDecision::DisconnectAndDiscourage { .. }));
        // forgotten after a ban, so the score resets for a hypothetical reconnect under the same id
        assert_eq!(registry.score(peer), 0);
    }

    #[test]
    fn invalid_pow_disconnects_immediately() {
        let registry = PeerRegistry::new(HeaderSyncConfig::default());
        let peer = PeerId::new(2);
        let decision = registry.report(peer, MisbehaviorReason::InvalidPow);
        assert!(matches!(decision, BanDecision::DisconnectAndDiscourage { .. }));
    }

    #[test]
    fn unconnecting_counter_tracks_and_decays() {
        let registry = PeerRegistry::new(HeaderSyncConfig::default());
        let peer = PeerId::new(3);
        registry.record_unconnecting(peer);
        registry.record_unconnecting(peer);
        assert_eq!(registry.unconnecting_count(peer), 2);
        registry.decay_unconnecting(peer);
        assert_eq!(registry.unconnecting_count(peer), 0);
    }
}
