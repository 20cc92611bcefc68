//! The height-indexed sequence of ancestors from genesis to the current
//! tip (spec §3.3).

use crate::blocks::BlockHash;
use crate::chain_storage::index::BlockIndex;

/// Maximum `locator()` length: ten single steps plus a doubling tail plus
/// genesis (spec §6.5).
pub const MAX_LOCATOR_ENTRIES: usize = 101;

#[derive(Debug, Default)]
pub struct ActiveChain {
    /// `heights[i]` is the hash of the ancestor at height `i`.
    heights: Vec<BlockHash>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tip(&self) -> Option<BlockHash> {
        self.heights.last().copied()
    }

    pub fn genesis(&self) -> Option<BlockHash> {
        self.heights.first().copied()
    }

    pub fn height(&self) -> Option<u64> {
        if self.heights.is_empty() {
            None
        } else {
            Some(self.heights.len() as u64 - 1)
        }
    }

    pub fn at(&self, height: u64) -> Option<BlockHash> {
        self.heights.get(height as usize).copied()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.heights.contains(hash)
    }

    /// Rebuilds the chain by walking `candidate` back to genesis via the
    /// index and validating contiguity (spec §4.1 `set_active_tip`).
    ///
    /// Returns `false` (no mutation) if the walk is broken (missing prev,
    /// non-decrementing heights) before reaching genesis.
    pub fn set_tip(&mut self, candidate: BlockHash, index: &BlockIndex) -> bool {
        let mut reversed = Vec::new();
        let mut current = Some(candidate);
        let mut expected_height = None;
        while let Some(hash) = current {
            let entry = match index.lookup(&hash) {
                Some(e) => e,
                None => return false,
            };
            if let Some(expected) = expected_height {
                if entry.height + 1 != expected {
                    return false;
                }
            }
            expected_height = Some(entry.height);
            reversed.push(hash);
            current = entry.prev;
        }
        if expected_height != Some(0) {
            return false;
        }
        reversed.reverse();
        self.heights = reversed;
        true
    }

    /// Finds the common ancestor of `candidate` and the current tip.
    pub fn find_fork(&self, candidate: BlockHash, index: &BlockIndex) -> Option<BlockHash> {
        let tip = self.tip()?;
        index.find_fork(tip, candidate)
    }

    /// Exponentially spaced ancestor hashes for a `getheaders` locator:
    /// the first ten ancestors one step apart, then doubling, ending at
    /// genesis. Length is always <= [`MAX_LOCATOR_ENTRIES`].
    pub fn locator(&self) -> Vec<BlockHash> {
        let mut out = Vec::new();
        if self.heights.is_empty() {
            return out;
        }
        let tip_height = self.heights.len() as u64 - 1;
        let mut step: u64 = 1;
        let mut height = tip_height;
        loop {
            out.push(self.heights[height as usize]);
            if height == 0 {
                break;
            }
            if out.len() >= 10 {
                step = step.saturating_mul(2);
            }
            height = height.saturating_sub(step);
            if out.len() + 1 >= MAX_LOCATOR_ENTRIES {
                out.push(self.heights[0]);
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::BlockHeader;
    use primitive_types::U256;

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
    fn genesis_only_locator_is_single_hash() {
        let mut index = BlockIndex::new();
        let g = header(BlockHash::ZERO, 0);
        index.insert_genesis(&g, U256::from(1000u64));
        let mut chain = ActiveChain::new();
        assert!(chain.set_tip(g.hash(), &index));
        assert_eq!(chain.locator(), vec![g.hash()]);
    }

    #[test]
    fn locator_ends_with_genesis_and_is_bounded() {
        let mut index = BlockIndex::new();
        let g = header(BlockHash::ZERO, 0);
        index.insert_genesis(&g, U256::from(1000u64));
        let mut prev = g.hash();
        for i in 1..300u32 {
            let h = header(prev, i);
            index.insert(&h, U256::from(1000u64)).unwrap();
            prev = h.hash();
        }
        let mut chain = ActiveChain::new();
        assert!(chain.set_tip(prev, &index));
        let locator = chain.locator();
        assert!(locator.len() <= MAX_LOCATOR_ENTRIES);
        assert_eq!(*locator.last().unwrap(), g.hash());
    }

    #[test]
    fn set_tip_rejects_broken_chain() {
        let index = BlockIndex::new();
        let mut chain = ActiveChain::new();
        assert!(!chain.set_tip(BlockHash::from_bytes([9u8; 32]), &index));
    }
}
