//! A single known header, valid or not (spec §3.2).

use bitflags::bitflags;
use primitive_types::U256;

use crate::blocks::BlockHash;

bitflags! {
    /// The highest level achievable for a headers-only node is
    /// `VALID_TREE`; `VALID_HEADER` is an intermediate milestone reached
    /// after Layer 2 but before the Layer 3 contextual checks pass.
    #[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
    pub struct EntryStatus: u32 {
        const VALID_HEADER = 0b0001;
        const VALID_TREE   = 0b0010;
        const FAILED_VALID = 0b0100;
        const FAILED_CHILD = 0b1000;
    }
}

impl EntryStatus {
    pub fn is_failed(self) -> bool {
        self.intersects(EntryStatus::FAILED_VALID | EntryStatus::FAILED_CHILD)
    }
}

#[derive(Debug, Clone)]
pub struct BlockIndexEntry {
    pub hash: BlockHash,
    pub prev: Option<BlockHash>,
    pub height: u64,
    pub chain_work: U256,
    pub status: EntryStatus,

    pub version: i32,
    pub miner_address: [u8; 20],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub randomx_hash: BlockHash,
}

impl BlockIndexEntry {
    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    pub fn is_valid_tree(&self) -> bool {
        self.status.contains(EntryStatus::VALID_TREE)
    }
}
