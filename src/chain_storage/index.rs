//! The arena-like tree of all known headers, keyed by hash (spec §4.1).
//!
//! Entries are never moved or removed once inserted (`failed_*` entries are
//! retained, not freed), so a [`BlockHash`] is a stable reference for the
//! lifetime of the index.

use std::collections::HashMap;

use primitive_types::U256;

use crate::blocks::{BlockHash, BlockHeader};
use crate::chain_storage::entry::{BlockIndexEntry, EntryStatus};
use crate::proof_of_work::block_proof;

#[derive(Debug, Default)]
pub struct BlockIndex {
    entries: HashMap<BlockHash, BlockIndexEntry>,
    /// Forward edges, used only to propagate `FAILED_CHILD` and to answer
    /// "what descends from this hash" for `invalidate_block`.
    children: HashMap<BlockHash, Vec<BlockHash>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, hash: &BlockHash) -> Option<&BlockIndexEntry> {
        self.entries.get(hash)
    }

    pub fn lookup_mut(&mut self, hash: &BlockHash) -> Option<&mut BlockIndexEntry> {
        self.entries.get_mut(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn children_of(&self, hash: &BlockHash) -> &[BlockHash] {
        self.children.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Inserts a genesis entry. Fails (returns `None`) if an entry with
    /// this hash already exists.
    pub fn insert_genesis(&mut self, header: &BlockHeader, target: U256) -> Option<&BlockIndexEntry> {
        let hash = header.hash();
        if self.entries.contains_key(&hash) {
            return self.entries.get(&hash);
        }
        let entry = BlockIndexEntry {
            hash,
            prev: None,
            height: 0,
            chain_work: block_proof(target),
            status: EntryStatus::empty(),
            version: header.version,
            miner_address: header.miner_address,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            randomx_hash: header.randomx_hash,
        };
        self.entries.insert(hash, entry);
        self.entries.get(&hash)
    }

    /// Inserts a non-genesis entry whose parent is already present.
    /// Returns `None` if a duplicate hash exists (caller should treat that
    /// as the existing-entry case) or if `prev` is absent from the index.
    pub fn insert(&mut self, header: &BlockHeader, target: U256) -> Option<BlockHash> {
        let hash = header.hash();
        if self.entries.contains_key(&hash) {
            return None;
        }
        let prev_entry = self.entries.get(&header.prev_hash)?;
        let height = prev_entry.height + 1;
        let chain_work = prev_entry.chain_work + block_proof(target);
        let entry = BlockIndexEntry {
            hash,
            prev: Some(header.prev_hash),
            height,
            chain_work,
            status: EntryStatus::empty(),
            version: header.version,
            miner_address: header.miner_address,
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            randomx_hash: header.randomx_hash,
        };
        self.entries.insert(hash, entry);
        self.children.entry(header.prev_hash).or_default().push(hash);
        Some(hash)
    }

    /// Walks `prev` from `hash` up to and including genesis, returning
    /// ancestors newest-first. Used to validate chain integrity before
    /// committing a new active tip.
    pub fn walk_to_genesis(&self, hash: BlockHash) -> Vec<BlockHash> {
        let mut out = Vec::new();
        let mut current = Some(hash);
        let mut expected_height: Option<u64> = None;
        while let Some(h) = current {
            let entry = match self.entries.get(&h) {
                Some(e) => e,
                None => break,
            };
            if let Some(expected) = expected_height {
                debug_assert_eq!(entry.height + 1, expected, "height must decrement by 1 while walking to genesis");
            }
            expected_height = Some(entry.height);
            out.push(h);
            current = entry.prev;
        }
        out
    }

    pub fn has_failed_ancestor(&self, hash: BlockHash) -> bool {
        let mut current = Some(hash);
        while let Some(h) = current {
            match self.entries.get(&h) {
                Some(entry) => {
                    if entry.is_failed() {
                        return true;
                    }
                    current = entry.prev;
                },
                None => return false,
            }
        }
        false
    }

    /// Finds the common ancestor of two entries already present in the
    /// index. Returns `None` if they belong to disjoint trees (different
    /// genesis), which callers MUST treat as a non-fatal, handled case
    /// rather than an assertion (spec §9 open question).
    pub fn find_fork(&self, a: BlockHash, b: BlockHash) -> Option<BlockHash> {
        let mut a_entry = self.entries.get(&a)?;
        let mut b_entry = self.entries.get(&b)?;
        let mut a_hash = a;
        let mut b_hash = b;

        while a_entry.height > b_entry.height {
            a_hash = a_entry.prev?;
            a_entry = self.entries.get(&a_hash)?;
        }
        while b_entry.height > a_entry.height {
            b_hash = b_entry.prev?;
            b_entry = self.entries.get(&b_hash)?;
        }
        while a_hash != b_hash {
            a_hash = a_entry.prev?;
            b_hash = b_entry.prev?;
            a_entry = self.entries.get(&a_hash)?;
            b_entry = self.entries.get(&b_hash)?;
        }
        Some(a_hash)
    }

    /// Marks `hash` (and everything already known to descend from it)
    /// failed, per `invalidate_block`'s semantics. The hash itself becomes
    /// `FAILED_VALID`; everything reachable via `children` becomes
    /// `FAILED_CHILD`.
    pub fn mark_failed_and_propagate(&mut self, hash: BlockHash) {
        if let Some(entry) = self.entries.get_mut(&hash) {
            entry.status.insert(EntryStatus::FAILED_VALID);
        } else {
            return;
        }
        let mut queue = self.children.get(&hash).cloned().unwrap_or_default();
        while let Some(child) = queue.pop() {
            if let Some(entry) = self.entries.get_mut(&child) {
                entry.status.insert(EntryStatus::FAILED_CHILD);
            }
            if let Some(grandchildren) = self.children.get(&child) {
                queue.extend(grandchildren.iter().copied());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, for persistence and best-candidate scanning.
    pub fn iter(&self) -> impl Iterator<Item = &BlockIndexEntry> {
        self.entries.values()
    }

    /// Directly inserts a fully-formed entry (used when restoring from
    /// persistence, where height/chain_work/status are already known
    /// rather than recomputed from a parent). Returns `false` if the hash
    /// already exists.
    pub fn insert_raw(&mut self, entry: BlockIndexEntry) -> bool {
        if self.entries.contains_key(&entry.hash) {
            return false;
        }
        if let Some(prev) = entry.prev {
            self.children.entry(prev).or_default().push(entry.hash);
        }
        self.entries.insert(entry.hash, entry);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::BlockHash;

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
    fn insert_without_parent_fails() {
        let mut index = BlockIndex::new();
        let h = header(BlockHash::from_bytes([1u8; 32]), 1);
        assert!(index.insert(&h, U256::from(1000u64)).is_none());
    }

    #[test]
    fn find_fork_returns_none_for_disjoint_trees() {
        let mut index = BlockIndex::new();
        let g1 = header(BlockHash::ZERO, 0);
        let g2 = header(BlockHash::ZERO, 1);
        index.insert_genesis(&g1, U256::from(1000u64));
        index.insert_genesis(&g2, U256::from(1000u64));
        assert_eq!(index.find_fork(g1.hash(), g2.hash()), None);
    }

    #[test]
    fn find_fork_finds_shared_ancestor() {
        let mut index = BlockIndex::new();
        let g = header(BlockHash::ZERO, 0);
        index.insert_genesis(&g, U256::from(1000u64));
        let a1 = header(g.hash(), 1);
        index.insert(&a1, U256::from(1000u64)).unwrap();
        let b1 = header(g.hash(), 2);
        index.insert(&b1, U256::from(1000u64)).unwrap();
        assert_eq!(index.find_fork(a1.hash(), b1.hash()), Some(g.hash()));
    }

    #[test]
    fn failed_propagates_to_children() {
        let mut index = BlockIndex::new();
        let g = header(BlockHash::ZERO, 0);
        index.insert_genesis(&g, U256::from(1000u64));
        let a1 = header(g.hash(), 1);
        index.insert(&a1, U256::from(1000u64)).unwrap();
        let a2 = header(a1.hash(), 2);
        index.insert(&a2, U256::from(1000u64)).unwrap();

        index.mark_failed_and_propagate(a1.hash());
        assert!(index.lookup(&a1.hash()).unwrap().status.contains(EntryStatus::FAILED_VALID));
        assert!(index.lookup(&a2.hash()).unwrap().status.contains(EntryStatus::FAILED_CHILD));
    }
}
