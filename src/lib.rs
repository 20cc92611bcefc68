// Consensus core for a headers-only proof-of-work chain node.
//
// This crate owns the header validation pipeline, the in-memory block-index
// tree with chain selection and reorganization, orphan and failure
// tracking, RandomX proof-of-work verification, ASERT difficulty
// adjustment, and the peer-facing header-sync state machine. Transport,
// peer discovery, RPC and CLI surfaces are deliberately external: this
// crate exposes narrow interfaces for them to call.

pub mod blocks;
pub mod chain_storage;
pub mod common;
pub mod consensus;
pub mod persistence;
pub mod proof_of_work;
pub mod sync;
pub mod validation;
pub mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod test_helpers;

pub use blocks::{BlockHash, BlockHeader};
pub use chain_storage::ChainState;
pub use consensus::ConsensusParams;
