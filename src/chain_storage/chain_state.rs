//! The chainstate orchestrator: the single serialization point for all
//! index-modifying and chain-selecting operations (spec §4.3).
//!
//! `accept_header` internally drives `activate_best_chain` and
//! `process_orphan_children`. Rather than re-entering a (non-reentrant)
//! `std::sync::Mutex`, the lock is acquired once per public call and the
//! "re-entrant" calls are modeled as a work queue drained under that single
//! guard - the design note's recommended refactor for languages without a
//! re-entrant lock primitive.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::{debug, info, warn};
use primitive_types::U256;

use crate::blocks::{bits_to_target, target_to_bits, BlockHash, BlockHeader};
use crate::chain_storage::active_chain::ActiveChain;
use crate::chain_storage::config::ChainStateConfig;
use crate::chain_storage::entry::{BlockIndexEntry, EntryStatus};
use crate::chain_storage::error::{AcceptHeaderReject, ChainStateError};
use crate::chain_storage::hooks::{Hooks, TipChangedEvent};
use crate::chain_storage::index::BlockIndex;
use crate::chain_storage::orphan::{OrphanEntry, OrphanPool};
use crate::common::time::NetworkTimeOffset;
use crate::common::PeerId;
use crate::consensus::ConsensusParams;
use crate::proof_of_work::asert::{next_target, AsertAnchor};
use crate::proof_of_work::randomx::RandomXEngine;
use crate::validation::{layer1_prefilter, layer2_context_free, layer3_contextual};

pub const LOG_TARGET: &str = "chain::state";

/// A cheap snapshot of the current tip, safe to clone out of the lock for
/// status reporting (spec §6.4 `get_tip`).
#[derive(Debug, Clone)]
pub struct ChainMetadata {
    pub tip_hash: BlockHash,
    pub height: u64,
    pub accumulated_difficulty: U256,
    pub timestamp: u32,
}

struct Inner {
    index: BlockIndex,
    active_chain: ActiveChain,
    orphans: OrphanPool,
    best_header: Option<BlockHash>,
    anchor: Option<AsertAnchor>,
}

pub struct ChainState {
    consensus: ConsensusParams,
    pow: RandomXEngine,
    config: ChainStateConfig,
    time_offset: Mutex<NetworkTimeOffset>,
    inner: Mutex<Inner>,
    hooks: Mutex<Hooks>,
}

impl ChainState {
    pub fn new(consensus: ConsensusParams, config: ChainStateConfig) -> Self {
        Self {
            pow: RandomXEngine::new(crate::proof_of_work::randomx::DEFAULT_VM_CACHE_CAPACITY),
            consensus,
            config,
            time_offset: Mutex::new(NetworkTimeOffset::new()),
            inner: Mutex::new(Inner {
                index: BlockIndex::new(),
                active_chain: ActiveChain::new(),
                orphans: OrphanPool::new(),
                best_header: None,
                anchor: None,
            }),
            hooks: Mutex::new(Hooks::new()),
        }
    }

    pub fn hooks(&self) -> std::sync::MutexGuard<'_, Hooks> {
        self.hooks.lock().expect("hooks mutex poisoned")
    }

    pub fn record_peer_time_sample(&self, peer_time: i64, local_time: i64) {
        self.time_offset.lock().expect("time offset mutex poisoned").add_sample(peer_time, local_time);
    }

    /// Initializes the index with the network's one true genesis header.
    /// Must be called before any `accept_header` call.
    pub fn init_genesis(&self, genesis: BlockHeader) -> Result<(), AcceptHeaderReject> {
        let hash = genesis.hash();
        if hash != self.consensus.genesis_hash {
            return Err(AcceptHeaderReject::BadGenesis);
        }
        let target = bits_to_target(genesis.bits);
        let mut inner = self.inner.lock().expect("chainstate mutex poisoned");
        inner.index.insert_genesis(&genesis, target);
        if let Some(entry) = inner.index.lookup_mut(&hash) {
            entry.status.insert(EntryStatus::VALID_HEADER | EntryStatus::VALID_TREE);
        }
        inner.active_chain.set_tip(hash, &inner.index);
        inner.best_header = Some(hash);
        inner.anchor = Some(AsertAnchor {
            anchor_height: self.consensus.anchor_height,
            anchor_parent_time: genesis.time,
            anchor_target: target,
            target_spacing: self.consensus.target_spacing,
            half_life: self.consensus.half_life,
            pow_limit: self.consensus.pow_limit,
        });
        Ok(())
    }

    /// Spec §4.3 `accept_header`, with `process_orphan_children` modeled as
    /// an iterative queue rather than recursion.
    pub fn accept_header(&self, header: BlockHeader, peer: PeerId, now: u64) -> Result<BlockHash, AcceptHeaderReject> {
        let mut inner = self.inner.lock().expect("chainstate mutex poisoned");
        let mut queue: VecDeque<(BlockHeader, PeerId)> = VecDeque::new();
        queue.push_back((header, peer));
        let mut first_result = None;

        while let Some((h, p)) = queue.pop_front() {
            let result = self.accept_single_locked(&mut inner, h, p, now);
            if let Ok(accepted_hash) = result {
                let children = inner.orphans.drain_children(accepted_hash);
                for child in children {
                    queue.push_back((child.header, child.peer));
                }
            }
            if first_result.is_none() {
                first_result = Some(result);
            }
        }
        first_result.expect("queue always starts with at least one entry")
    }

    fn accept_single_locked(
        &self,
        inner: &mut Inner,
        header: BlockHeader,
        peer: PeerId,
        now: u64,
    ) -> Result<BlockHash, AcceptHeaderReject> {
        let hash = header.hash();

        if let Some(existing) = inner.index.lookup(&hash) {
            if existing.is_valid_tree() {
                // Normal peer redundancy, not misbehavior (spec §4.2).
                return Ok(hash);
            }
            if existing.is_failed() {
                return Err(AcceptHeaderReject::InvalidAncestor);
            }
        }

        if inner.index.has_failed_ancestor(header.prev_hash) {
            return Err(AcceptHeaderReject::InvalidAncestor);
        }

        let target = bits_to_target(header.bits);
        layer1_prefilter(&header, target).map_err(|_| AcceptHeaderReject::InvalidPowCommitment)?;

        if header.is_genesis_candidate() {
            // Either this is the configured genesis (already handled by
            // `init_genesis`, so a re-delivery is the duplicate-valid case
            // caught above) or it claims an all-zero `prev_hash` without
            // matching the configured hash - both are rejected the same way.
            return Err(AcceptHeaderReject::BadGenesis);
        }

        let parent: BlockIndexEntry = match inner.index.lookup(&header.prev_hash) {
            Some(p) => p.clone(),
            None => {
                inner.orphans.try_add(header.clone(), peer, now);
                return Err(AcceptHeaderReject::Orphan(header.prev_hash));
            },
        };

        if parent.is_failed() {
            if let Some(h) = inner.index.insert(&header, target) {
                if let Some(e) = inner.index.lookup_mut(&h) {
                    e.status.insert(EntryStatus::FAILED_CHILD);
                }
            }
            return Err(AcceptHeaderReject::InvalidAncestor);
        }

        let candidate_height = parent.height + 1;
        if let Some((_, expected_hash)) = self.config.checkpoints.iter().find(|(h, _)| *h == candidate_height) {
            if *expected_hash != hash {
                return Err(AcceptHeaderReject::CheckpointMismatch);
            }
        }

        if let Err(e) = layer2_context_free(&header, target, &self.pow, self.consensus.randomx_epoch_duration) {
            self.insert_failed(inner, &header, target);
            return Err(e.into());
        }

        let ancestor_times = gather_ancestor_times(&inner.index, header.prev_hash, self.consensus.mtp_window);
        let adjusted_now = self.time_offset.lock().expect("time offset mutex poisoned").adjusted_time(now as i64);
        let anchor = inner.anchor.expect("anchor set by init_genesis");
        let expected_target = next_target(parent.height, parent.time, &anchor);
        let expected_bits = target_to_bits(expected_target);

        if let Err(e) =
            layer3_contextual(&header, &ancestor_times, adjusted_now, self.consensus.max_future_time_secs, expected_bits)
        {
            self.insert_failed(inner, &header, target);
            return Err(e.into());
        }

        let h = inner
            .index
            .insert(&header, target)
            .expect("parent present and hash not a duplicate, checked above");
        if let Some(entry) = inner.index.lookup_mut(&h) {
            entry.status.insert(EntryStatus::VALID_HEADER | EntryStatus::VALID_TREE);
        }

        let chain_work = inner.index.lookup(&h).expect("just inserted").chain_work;
        let is_new_best = match inner.best_header.and_then(|b| inner.index.lookup(&b)) {
            Some(best) => chain_work > best.chain_work,
            None => true,
        };
        if is_new_best {
            inner.best_header = Some(h);
        }

        self.activate_best_chain(inner);

        Ok(h)
    }

    fn insert_failed(&self, inner: &mut Inner, header: &BlockHeader, target: U256) {
        if let Some(h) = inner.index.insert(header, target) {
            if let Some(e) = inner.index.lookup_mut(&h) {
                e.status.insert(EntryStatus::FAILED_VALID);
            }
        }
    }

    /// Spec §4.3 `activate_best_chain`.
    fn activate_best_chain(&self, inner: &mut Inner) {
        let current_tip = match inner.active_chain.tip() {
            Some(t) => t,
            None => return,
        };
        let current_work = inner.index.lookup(&current_tip).map(|e| e.chain_work).unwrap_or_default();

        let candidate = inner
            .index
            .iter()
            .filter(|e| !e.is_failed())
            .filter(|e| e.chain_work > current_work)
            .filter(|e| satisfies_checkpoints(&inner.index, e, &self.config.checkpoints))
            .fold(None::<&BlockIndexEntry>, |best, e| match best {
                None => Some(e),
                Some(b) if e.chain_work > b.chain_work => Some(e),
                Some(b) if e.chain_work == b.chain_work && e.hash < b.hash => Some(e),
                Some(b) => Some(b),
            })
            .map(|e| e.hash);

        let candidate = match candidate {
            Some(c) => c,
            None => return,
        };

        let fork = match inner.index.find_fork(current_tip, candidate) {
            Some(f) => f,
            None => {
                warn!(target: LOG_TARGET, "no common ancestor between current tip and reorg candidate");
                return;
            },
        };

        let fork_height = inner.index.lookup(&fork).map(|e| e.height).unwrap_or(0);
        let current_height = inner.index.lookup(&current_tip).map(|e| e.height).unwrap_or(0);
        let reorg_depth = current_height.saturating_sub(fork_height);

        if self.config.suspicious_reorg_depth > 0 && reorg_depth > self.config.suspicious_reorg_depth {
            warn!(
                target: LOG_TARGET,
                "reorg depth {} exceeds suspicious threshold {}; halting tip switch", reorg_depth, self.config.suspicious_reorg_depth
            );
            return;
        }

        if !inner.active_chain.set_tip(candidate, &inner.index) {
            warn!(target: LOG_TARGET, "set_tip failed for candidate {}; chain left unchanged", candidate);
            return;
        }

        info!(target: LOG_TARGET, "tip changed: {} -> {}", current_tip, candidate);
        let new_height = inner.index.lookup(&candidate).map(|e| e.height).unwrap_or(0);
        let mut hooks = self.hooks.lock().expect("hooks mutex poisoned");
        hooks.call_on_block_connected_hooks(candidate);
        hooks.call_on_tip_changed_hooks(&TipChangedEvent {
            old_tip: Some(current_tip),
            new_tip: candidate,
            new_height,
        });
    }

    /// Operator command (spec §4.3 `invalidate_block`): marks `hash` and
    /// its descendants failed, then re-runs chain selection.
    pub fn invalidate_block(&self, hash: BlockHash) -> Result<(), ChainStateError> {
        let mut inner = self.inner.lock().expect("chainstate mutex poisoned");
        if !inner.index.contains(&hash) {
            return Err(ChainStateError::UnknownHash(hash));
        }
        inner.index.mark_failed_and_propagate(hash);
        self.activate_best_chain(&mut inner);
        Ok(())
    }

    pub fn get_tip(&self) -> Option<ChainMetadata> {
        let inner = self.inner.lock().expect("chainstate mutex poisoned");
        let tip = inner.active_chain.tip()?;
        let entry = inner.index.lookup(&tip)?;
        Some(ChainMetadata {
            tip_hash: tip,
            height: entry.height,
            accumulated_difficulty: entry.chain_work,
            timestamp: entry.time,
        })
    }

    pub fn get_best_header(&self) -> Option<BlockHash> {
        self.inner.lock().expect("chainstate mutex poisoned").best_header
    }

    pub fn get_block_by_hash(&self, hash: &BlockHash) -> Option<BlockIndexEntry> {
        self.inner.lock().expect("chainstate mutex poisoned").index.lookup(hash).cloned()
    }

    pub fn get_block_by_height(&self, height: u64) -> Option<BlockIndexEntry> {
        let inner = self.inner.lock().expect("chainstate mutex poisoned");
        let hash = inner.active_chain.at(height)?;
        inner.index.lookup(&hash).cloned()
    }

    pub fn build_locator(&self) -> Vec<BlockHash> {
        self.inner.lock().expect("chainstate mutex poisoned").active_chain.locator()
    }

    /// Spec §6.4/SPEC_FULL §2: best header time within 2x target spacing of
    /// network-adjusted time.
    pub fn is_initial_sync(&self, now: u64) -> bool {
        let inner = self.inner.lock().expect("chainstate mutex poisoned");
        let best_time = match inner.best_header.and_then(|h| inner.index.lookup(&h)) {
            Some(e) => e.time as i64,
            None => return true,
        };
        let adjusted_now = self.time_offset.lock().expect("time offset mutex poisoned").adjusted_time(now as i64);
        let threshold = 2 * self.consensus.target_spacing as i64;
        (adjusted_now - best_time).abs() > threshold
    }

    pub fn orphan_count(&self) -> usize {
        self.inner.lock().expect("chainstate mutex poisoned").orphans.len()
    }

    pub fn orphan_count_for_peer(&self, peer: PeerId) -> usize {
        self.inner.lock().expect("chainstate mutex poisoned").orphans.peer_count(peer)
    }

    pub fn evict_expired_orphans(&self, now: u64) {
        self.inner.lock().expect("chainstate mutex poisoned").orphans.evict_expired(now);
    }

    /// A point-in-time copy of every known entry and the active tip hash,
    /// for the persistence layer (spec §4.8/§6.3).
    pub fn snapshot(&self) -> (Vec<BlockIndexEntry>, Option<BlockHash>) {
        let inner = self.inner.lock().expect("chainstate mutex poisoned");
        (inner.index.iter().cloned().collect(), inner.active_chain.tip())
    }

    /// Rebuilds a `ChainState` from a previously saved snapshot. Entries
    /// are inserted in a single pass (their prev references are already
    /// hashes, so no pointer fix-up pass is required by this
    /// representation); the active chain is then recomputed by walking the
    /// recorded tip back to genesis, which validates contiguity exactly as
    /// `set_active_tip` would for a freshly accepted header.
    pub fn from_snapshot(
        consensus: ConsensusParams,
        config: ChainStateConfig,
        entries: Vec<BlockIndexEntry>,
        tip: Option<BlockHash>,
    ) -> Self {
        let state = Self::new(consensus, config);
        {
            let mut inner = state.inner.lock().expect("chainstate mutex poisoned");
            let mut best_work = U256::zero();
            let mut best_header = None;
            for entry in entries {
                if entry.prev.is_none() {
                    inner.anchor = Some(AsertAnchor {
                        anchor_height: state.consensus.anchor_height,
                        anchor_parent_time: entry.time,
                        anchor_target: bits_to_target(entry.bits),
                        target_spacing: state.consensus.target_spacing,
                        half_life: state.consensus.half_life,
                        pow_limit: state.consensus.pow_limit,
                    });
                }
                if entry.chain_work > best_work || best_header.is_none() {
                    best_work = entry.chain_work;
                    best_header = Some(entry.hash);
                }
                inner.index.insert_raw(entry);
            }
            inner.best_header = best_header;
            if let Some(tip_hash) = tip {
                inner.active_chain.set_tip(tip_hash, &inner.index);
            }
        }
        state
    }
}

/// Walks `prev` from `from` gathering up to `window` ancestor timestamps,
/// for Median Time Past.
fn gather_ancestor_times(index: &BlockIndex, from: BlockHash, window: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(window);
    let mut current = Some(from);
    while out.len() < window {
        let hash = match current {
            Some(h) => h,
            None => break,
        };
        let entry = match index.lookup(&hash) {
            Some(e) => e,
            None => break,
        };
        out.push(entry.time);
        current = entry.prev;
    }
    out
}

/// SPEC_FULL §2 (Checkpoints): a reorg candidate is only eligible if its
/// ancestry agrees with every checkpoint at or below its own height -
/// forks that diverge before the last checkpoint are never reorg
/// candidates, matching the same checkpoint table `accept_header` already
/// enforces on insertion.
fn satisfies_checkpoints(index: &BlockIndex, entry: &BlockIndexEntry, checkpoints: &[(u64, BlockHash)]) -> bool {
    let min_checkpoint_height = match checkpoints.iter().map(|(h, _)| *h).filter(|h| *h <= entry.height).min() {
        Some(h) => h,
        None => return true,
    };
    let mut hash = entry.hash;
    let mut height = entry.height;
    loop {
        if let Some((_, expected)) = checkpoints.iter().find(|(h, _)| *h == height) {
            if *expected != hash {
                return false;
            }
        }
        if height <= min_checkpoint_height {
            return true;
        }
        match index.lookup(&hash).and_then(|e| e.prev) {
            Some(prev) => {
                hash = prev;
                height -= 1;
            },
            None => return true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::double_sha256;

    fn mine(mut header: BlockHeader, target: U256) -> BlockHeader {
        // Test-only brute-force "mining": since pow_limit is huge and
        // verification for these tests only exercises the commitment-only
        // predicate (layer1), a header's randomx_hash field is simply set
        // to something at/under target rather than running RandomX.
        header.randomx_hash = {
            let mut bytes = [0u8; 32];
            target.to_little_endian(&mut bytes);
            BlockHash::from_bytes(bytes)
        };
        header
    }

    fn test_consensus(genesis_hash: BlockHash) -> ConsensusParams {
        ConsensusParams::for_test(genesis_hash)
    }

    fn genesis_header(pow_limit: U256) -> BlockHeader {
        let mut h = BlockHeader {
            version: 1,
            prev_hash: BlockHash::ZERO,
            miner_address: [0u8; 20],
            time: 0,
            bits: target_to_bits(pow_limit),
            nonce: 0,
            randomx_hash: BlockHash::ZERO,
        };
        h = mine(h, pow_limit);
        h
    }

    #[test]
    fn duplicate_accept_returns_same_hash_without_reject() {
        let pow_limit = U256::MAX >> 8;
        let genesis = genesis_header(pow_limit);
        let genesis_hash = genesis.hash();
        let consensus = test_consensus(genesis_hash);
        let state = ChainState::new(consensus, ChainStateConfig::default());
        state.init_genesis(genesis).unwrap();

        let meta = state.get_tip().unwrap();
        assert_eq!(meta.tip_hash, genesis_hash);
        assert_eq!(meta.height, 0);
    }

    #[test]
    fn locator_on_genesis_only_chain() {
        let pow_limit = U256::MAX >> 8;
        let genesis = genesis_header(pow_limit);
        let genesis_hash = genesis.hash();
        let consensus = test_consensus(genesis_hash);
        let state = ChainState::new(consensus, ChainStateConfig::default());
        state.init_genesis(genesis).unwrap();
        assert_eq!(state.build_locator(), vec![genesis_hash]);
    }

    #[test]
    fn orphan_header_is_tracked_until_parent_arrives() {
        let pow_limit = U256::MAX >> 8;
        let genesis = genesis_header(pow_limit);
        let genesis_hash = genesis.hash();
        let consensus = test_consensus(genesis_hash);
        let state = ChainState::new(consensus, ChainStateConfig::default());
        state.init_genesis(genesis).unwrap();

        let unknown_parent = double_sha256(b"unknown-parent");
        let mut orphan_header = BlockHeader {
            version: 1,
            prev_hash: unknown_parent,
            miner_address: [0u8; 20],
            time: 10,
            bits: target_to_bits(pow_limit),
            nonce: 0,
            randomx_hash: BlockHash::ZERO,
        };
        orphan_header = mine(orphan_header, pow_limit);

        let result = state.accept_header(orphan_header, PeerId::new(1), 100);
        assert!(matches!(result, Err(AcceptHeaderReject::Orphan(_))));
        assert_eq!(state.orphan_count(), 1);
        assert_eq!(state.orphan_count_for_peer(PeerId::new(1)), 1);
    }
}
