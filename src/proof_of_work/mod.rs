pub mod asert;
pub mod error;
pub mod randomx;

pub use error::PowError;

use primitive_types::{U256, U512};

/// `block_proof(bits) = floor(2^256 / (target + 1))`, the work a single
/// block with this target contributes to cumulative chain work (spec
/// §3.2).
pub fn block_proof(target: U256) -> U256 {
    let denom = U512::from(target) + U512::from(1u8);
    let numerator = U512::from(1u8) << 256;
    let quotient = numerator / denom;
    // Only possible when target == 0, which valid consensus targets never
    // are; saturate defensively rather than panic on truncation.
    if quotient > U512::from(U256::MAX) {
        U256::MAX
    } else {
        let mut bytes = [0u8; 64];
        quotient.to_little_endian(&mut bytes);
        U256::from_little_endian(&bytes[..32])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn proof_decreases_as_target_grows() {
        let small_target = U256::from(1_000u64);
        let large_target = U256::from(1_000_000u64);
        assert!(block_proof(small_target) > block_proof(large_target));
    }

    #[test]
    fn proof_of_max_target_is_small() {
        let proof = block_proof(U256::MAX);
        assert_eq!(proof, U256::one());
    }
}
