//! Per-peer sync bookkeeping (spec §3.6).

/// Tracked for every active peer id. Mutable only under the peer-registry
/// mutex (spec §5), which is acquired strictly after the chainstate lock
/// when both are needed.
#[derive(Debug, Clone, Default)]
pub struct PeerSyncState {
    misbehavior_score: u32,
    unconnecting_headers_count: u32,
}

/// Misbehavior scores saturate somewhere comfortably above the ban
/// threshold rather than at `u32::MAX`, so a long-lived peer that keeps
/// racking up small infractions after a ban decision has already fired
/// cannot wrap or take unusually long to re-cross the threshold after a
/// hypothetical score reset.
const SCORE_CEILING: u32 = 10_000;

impl PeerSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn misbehavior_score(&self) -> u32 {
        self.misbehavior_score
    }

    /// Adds misbehavior points, saturating at [`SCORE_CEILING`]. Returns the
    /// new score.
    pub fn add_score(&mut self, points: u32) -> u32 {
        self.misbehavior_score = self.misbehavior_score.saturating_add(points).min(SCORE_CEILING);
        self.misbehavior_score
    }

    pub fn unconnecting_headers_count(&self) -> u32 {
        self.unconnecting_headers_count
    }

    pub fn increment_unconnecting(&mut self) -> u32 {
        self.unconnecting_headers_count = self.unconnecting_headers_count.saturating_add(1);
        self.unconnecting_headers_count
    }

    /// Decays (never resets outright) the unconnecting counter on a
    /// successful non-orphan accept (spec §4.7).
    pub fn decay_unconnecting(&mut self, by: u32) {
        self.unconnecting_headers_count = self.unconnecting_headers_count.saturating_sub(by);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn score_is_monotonic_and_saturates() {
        let mut s = PeerSyncState::new();
        assert_eq!(s.add_score(20), 20);
        assert_eq!(s.add_score(100), 120);
        for _ in 0..200 {
            s.add_score(100);
        }
        assert_eq!(s.misbehavior_score(), SCORE_CEILING);
    }

    #[test]
    fn unconnecting_decays_without_going_negative() {
        let mut s = PeerSyncState::new();
        s.increment_unconnecting();
        s.increment_unconnecting();
        s.decay_unconnecting(5);
        assert_eq!(s.unconnecting_headers_count(), 0);
    }
}
