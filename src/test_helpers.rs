//! Deterministic test fixtures: a low-difficulty genesis header and a
//! builder that mines real, passing RandomX headers off a given parent.
//!
//! Gated the same way `tari_core::test_helpers` is: available to this
//! crate's own `#[cfg(test)]` modules and to downstream crates that enable
//! the `test-support` feature for their own integration tests.

use primitive_types::U256;

use crate::blocks::{target_to_bits, BlockHash, BlockHeader};
use crate::consensus::ConsensusParams;
use crate::proof_of_work::randomx::RandomXEngine;

/// A permissive `pow_limit` (target close to `2^256`) so mining a passing
/// header takes on the order of a few hundred hash attempts rather than
/// being computationally infeasible in a test run.
pub fn test_pow_limit() -> U256 {
    U256::MAX >> 8
}

/// Builds and mines a genesis candidate: `prev_hash = ZERO`, `time = 0`,
/// `bits` set to `test_pow_limit()`.
pub fn mine_genesis(engine: &RandomXEngine, epoch_duration: u64) -> BlockHeader {
    let pow_limit = test_pow_limit();
    let template = BlockHeader {
        version: 1,
        prev_hash: BlockHash::ZERO,
        miner_address: [0u8; 20],
        time: 0,
        bits: target_to_bits(pow_limit),
        nonce: 0,
        randomx_hash: BlockHash::ZERO,
    };
    mine(engine, template, pow_limit, epoch_duration)
}

/// Builds and mines a header descending from `parent`, at `time`, targeting
/// `bits`.
pub fn mine_child(
    engine: &RandomXEngine,
    parent_hash: BlockHash,
    time: u32,
    bits: u32,
    epoch_duration: u64,
) -> BlockHeader {
    let target = crate::blocks::bits_to_target(bits);
    let template = BlockHeader {
        version: 1,
        prev_hash: parent_hash,
        miner_address: [0u8; 20],
        time,
        bits,
        nonce: 0,
        randomx_hash: BlockHash::ZERO,
    };
    mine(engine, template, target, epoch_duration)
}

/// Increments `nonce` until the real RandomX commitment meets `target`,
/// mirroring actual mining rather than faking the commitment field.
fn mine(engine: &RandomXEngine, mut header: BlockHeader, target: U256, epoch_duration: u64) -> BlockHeader {
    for nonce in 0u32..=u32::MAX {
        header.nonce = nonce;
        let commitment = engine
            .compute_commitment(&header, epoch_duration)
            .expect("randomx engine available in tests");
        if commitment.as_u256() <= target {
            header.randomx_hash = commitment;
            return header;
        }
    }
    unreachable!("u32 nonce space exhausted without finding a passing header")
}

/// A `ConsensusParams` matched to [`test_pow_limit`] and a short ASERT
/// half-life, suitable for exercising `ChainState` end-to-end.
pub fn test_consensus(genesis_hash: BlockHash) -> ConsensusParams {
    ConsensusParams::for_test(genesis_hash)
}
