//! Network-wide consensus constants (spec §6.5).
//!
//! These are consensus-critical: changing any of them changes which chain
//! of headers validates. They are kept in a dedicated type separate from
//! the ambient, non-consensus tuning knobs in [`crate::chain_storage`] and
//! [`crate::sync`] config structs, since the two have very different
//! change-management requirements.

use primitive_types::U256;

use crate::blocks::BlockHash;

/// Domain separator mixed into the RandomX epoch seed derivation
/// (spec §4.4). Consensus-critical: every node on the same network MUST
/// use the exact same bytes here.
pub const RANDOMX_SEED_DOMAIN_TAG: &[u8] = b"chainbase/randomx-epoch-seed/v1";

#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Hash of the one genesis header this network accepts.
    pub genesis_hash: BlockHash,
    /// Target spacing between blocks, in seconds.
    pub target_spacing: u32,
    /// ASERT half-life, in seconds.
    pub half_life: u32,
    /// Height of the ASERT anchor block.
    pub anchor_height: u64,
    /// Maximum target permitted on this network (minimum difficulty).
    pub pow_limit: U256,
    /// RandomX epoch duration, in seconds.
    pub randomx_epoch_duration: u64,
    /// Ancestor count used for Median Time Past.
    pub mtp_window: usize,
    /// Maximum permitted drift of a header's time into the future, relative
    /// to network-adjusted time.
    pub max_future_time_secs: i64,
}

impl ConsensusParams {
    /// A parameter set intended for tests: a low `pow_limit` so headers can
    /// be mined quickly and a short ASERT half-life.
    #[cfg(any(test, feature = "test-support"))]
    pub fn for_test(genesis_hash: BlockHash) -> Self {
        Self {
            genesis_hash,
            target_spacing: 120,
            half_life: 172_800,
            anchor_height: 1,
            pow_limit: U256::MAX >> 8,
            randomx_epoch_duration: 604_800,
            mtp_window: 11,
            max_future_time_secs: 7200,
        }
    }
}
