//! The three-layer header validation pipeline (spec §4.2).

pub mod error;
pub mod helpers;

pub use error::ValidationError;

use primitive_types::U256;

use crate::blocks::BlockHeader;
use crate::proof_of_work::randomx::RandomXEngine;

/// Layer 1: fast, context-free, batch-friendly pre-filter. Checks only that
/// the header's stored PoW commitment meets its own claimed target.
pub fn layer1_prefilter(header: &BlockHeader, target: U256) -> Result<(), ValidationError> {
    RandomXEngine::verify_commitment_only(header, target).map_err(Into::into)
}

/// Layer 2: context-free per-header checks - full RandomX verification
/// plus structural validity.
pub fn layer2_context_free(
    header: &BlockHeader,
    target: U256,
    engine: &RandomXEngine,
    epoch_duration: u64,
) -> Result<(), ValidationError> {
    if header.version < 1 {
        return Err(ValidationError::InvalidVersion(header.version));
    }
    engine.verify_full(header, target, epoch_duration).map_err(Into::into)
}

/// Layer 3: contextual checks that require the parent and ancestor chain:
/// MTP ordering, max-future-time, and ASERT-predicted difficulty.
pub fn layer3_contextual(
    header: &BlockHeader,
    ancestor_times: &[u32],
    adjusted_now: i64,
    max_future_secs: i64,
    expected_bits: u32,
) -> Result<(), ValidationError> {
    helpers::check_timestamp(header.time, ancestor_times, adjusted_now, max_future_secs)?;
    if header.bits != expected_bits {
        return Err(ValidationError::BadDifficulty { expected: expected_bits, actual: header.bits });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::BlockHash;

    #[test]
    fn layer1_rejects_commitment_above_target() {
        let header = BlockHeader {
            version: 1,
            prev_hash: BlockHash::ZERO,
            miner_address: [0u8; 20],
            time: 0,
            bits: 0,
            nonce: 0,
            randomx_hash: BlockHash::from_bytes([0xff; 32]),
        };
        let target = U256::from(1u32);
        assert!(layer1_prefilter(&header, target).is_err());
    }

    #[test]
    fn layer2_rejects_bad_version() {
        let header = BlockHeader {
            version: 0,
            prev_hash: BlockHash::ZERO,
            miner_address: [0u8; 20],
            time: 0,
            bits: 0,
            nonce: 0,
            randomx_hash: BlockHash::ZERO,
        };
        let engine = RandomXEngine::new(2);
        let err = layer2_context_free(&header, U256::MAX, &engine, 604_800).unwrap_err();
        assert_eq!(err, ValidationError::InvalidVersion(0));
    }

    #[test]
    fn layer3_rejects_wrong_bits() {
        let header = BlockHeader {
            version: 1,
            prev_hash: BlockHash::ZERO,
            miner_address: [0u8; 20],
            time: 1000,
            bits: 5,
            nonce: 0,
            randomx_hash: BlockHash::ZERO,
        };
        let err = layer3_contextual(&header, &[500], 100_000, 7200, 6).unwrap_err();
        assert!(matches!(err, ValidationError::BadDifficulty { .. }));
    }
}
