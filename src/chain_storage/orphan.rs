//! Headers whose parent is not yet known (spec §3.4).

use std::collections::HashMap;

use crate::blocks::{BlockHash, BlockHeader};
use crate::common::PeerId;

/// Global orphan cap (spec §6.5).
pub const MAX_ORPHANS_GLOBAL: usize = 1000;
/// Per-peer orphan cap (spec §6.5).
pub const MAX_ORPHANS_PER_PEER: usize = 50;
/// Orphans older than this are eligible for eviction (spec §6.5).
pub const ORPHAN_EXPIRE_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct OrphanEntry {
    pub header: BlockHeader,
    pub peer: PeerId,
    pub arrival_time: u64,
}

#[derive(Debug, Default)]
pub struct OrphanPool {
    entries: HashMap<BlockHash, OrphanEntry>,
    /// Insertion order, oldest first, used for eviction without a
    /// per-entry scan.
    order: Vec<BlockHash>,
    per_peer_counts: HashMap<PeerId, usize>,
}

/// Outcome of a `try_add` call, used by the orchestrator to decide whether
/// to apply the `too_many_orphans` misbehavior penalty (spec §4.3).
#[derive(Debug, PartialEq, Eq)]
pub enum TryAddOutcome {
    Added,
    DroppedPeerAtCapacity,
    AlreadyPresent,
}

impl OrphanPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn peer_count(&self, peer: PeerId) -> usize {
        self.per_peer_counts.get(&peer).copied().unwrap_or(0)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Evicts orphans older than [`ORPHAN_EXPIRE_SECS`] relative to `now`.
    pub fn evict_expired(&mut self, now: u64) {
        let cutoff = now.saturating_sub(ORPHAN_EXPIRE_SECS);
        let expired: Vec<BlockHash> =
            self.order.iter().copied().filter(|h| self.entries.get(h).map(|e| e.arrival_time < cutoff).unwrap_or(false)).collect();
        for hash in expired {
            self.remove(&hash);
        }
    }

    fn remove(&mut self, hash: &BlockHash) -> Option<OrphanEntry> {
        let entry = self.entries.remove(hash)?;
        self.order.retain(|h| h != hash);
        if let Some(count) = self.per_peer_counts.get_mut(&entry.peer) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_peer_counts.remove(&entry.peer);
            }
        }
        Some(entry)
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.first().copied() {
            self.remove(&oldest);
        }
    }

    /// Attempts to add an orphan header (spec §4.3 `try_add_orphan`).
    ///
    /// At global capacity, the oldest orphan is evicted first regardless of
    /// which peer delivered it; only then is the per-peer cap enforced -
    /// a peer that is already at its own cap gets the new header dropped.
    pub fn try_add(&mut self, header: BlockHeader, peer: PeerId, now: u64) -> TryAddOutcome {
        let hash = header.hash();
        if self.entries.contains_key(&hash) {
            return TryAddOutcome::AlreadyPresent;
        }
        if self.entries.len() >= MAX_ORPHANS_GLOBAL {
            self.evict_oldest();
        }
        if self.peer_count(peer) >= MAX_ORPHANS_PER_PEER {
            return TryAddOutcome::DroppedPeerAtCapacity;
        }
        self.entries.insert(hash, OrphanEntry { header, peer, arrival_time: now });
        self.order.push(hash);
        *self.per_peer_counts.entry(peer).or_insert(0) += 1;
        TryAddOutcome::Added
    }

    /// Drains and returns every orphan whose `prev_hash` equals
    /// `parent_hash`, for re-submission via `accept_header` (spec §4.3
    /// `process_orphan_children`).
    pub fn drain_children(&mut self, parent_hash: BlockHash) -> Vec<OrphanEntry> {
        let matching: Vec<BlockHash> =
            self.entries.iter().filter(|(_, e)| e.header.prev_hash == parent_hash).map(|(h, _)| *h).collect();
        matching.into_iter().filter_map(|h| self.remove(&h)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(prev: BlockHash, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            miner_address: [0u8; 20],
            time: nonce,
            bits: 0x207f_ffff,
            nonce,
            randomx_hash: BlockHash::ZERO,
        }
    }

    #[test]
    fn per_peer_cap_drops_new_header() {
        let mut pool = OrphanPool::new();
        let peer = PeerId::new(1);
        for i in 0..MAX_ORPHANS_PER_PEER as u32 {
            let h = header(BlockHash::from_bytes([1u8; 32]), i);
            assert_eq!(pool.try_add(h, peer, 0), TryAddOutcome::Added);
        }
        let overflow = header(BlockHash::from_bytes([1u8; 32]), 999);
        assert_eq!(pool.try_add(overflow, peer, 0), TryAddOutcome::DroppedPeerAtCapacity);
        assert_eq!(pool.peer_count(peer), MAX_ORPHANS_PER_PEER);
    }

    #[test]
    fn global_cap_evicts_oldest_before_insert() {
        let mut pool = OrphanPool::new();
        for i in 0..MAX_ORPHANS_GLOBAL as u32 {
            let peer = PeerId::new((i % 100) as u64);
            let h = header(BlockHash::from_bytes([(i % 250) as u8; 32]), i);
            pool.try_add(h, peer, 0);
        }
        assert_eq!(pool.len(), MAX_ORPHANS_GLOBAL);
        let newcomer = header(BlockHash::from_bytes([250u8; 32]), 99999);
        let outcome = pool.try_add(newcomer, PeerId::new(500), 0);
        assert_eq!(outcome, TryAddOutcome::Added);
        assert_eq!(pool.len(), MAX_ORPHANS_GLOBAL);
    }

    #[test]
    fn drain_children_removes_and_returns_matches() {
        let mut pool = OrphanPool::new();
        let parent = BlockHash::from_bytes([1u8; 32]);
        let peer = PeerId::new(1);
        let c2 = header(parent, 2);
        let c3 = header(parent, 3);
        pool.try_add(c2, peer, 0);
        pool.try_add(c3, peer, 0);
        assert_eq!(pool.len(), 2);
        let drained = pool.drain_children(parent);
        assert_eq!(drained.len(), 2);
        assert!(pool.is_empty());
        assert_eq!(pool.peer_count(peer), 0);
    }

    #[test]
    fn expired_orphans_are_evicted() {
        let mut pool = OrphanPool::new();
        let h = header(BlockHash::from_bytes([1u8; 32]), 1);
        pool.try_add(h, PeerId::new(1), 0);
        pool.evict_expired(ORPHAN_EXPIRE_SECS + 1);
        assert!(pool.is_empty());
    }
}
