//! ASERT exponential difficulty adjustment (spec §4.5).
//!
//! The intermediate multiply `anchor_target * factor` can exceed 256 bits,
//! so the whole computation is carried out in arbitrary-precision signed
//! integers (comfortably exceeding the 512-bit minimum the spec mandates)
//! and only the final, clamped result is narrowed back to a 256-bit target.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use primitive_types::U256;

/// Anchor and per-network parameters needed to predict the next `bits`.
#[derive(Debug, Clone, Copy)]
pub struct AsertAnchor {
    pub anchor_height: u64,
    pub anchor_parent_time: u32,
    pub anchor_target: U256,
    pub target_spacing: u32,
    pub half_life: u32,
    pub pow_limit: U256,
}

fn u256_to_bigint(value: U256) -> BigInt {
    let mut bytes = [0u8; 32];
    value.to_little_endian(&mut bytes);
    BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes)
}

fn bigint_to_u256_clamped(value: &BigInt, pow_limit: U256) -> U256 {
    if value.is_negative() || value.is_zero() {
        // A target of zero is never valid PoW; ASERT's reference
        // implementation floors at 1 rather than letting the target
        // collapse, so we do the same here.
        return U256::one();
    }
    let (_, bytes) = value.to_bytes_le();
    if bytes.len() > 32 {
        return pow_limit;
    }
    let mut buf = [0u8; 32];
    buf[..bytes.len()].copy_from_slice(&bytes);
    let candidate = U256::from_little_endian(&buf);
    if candidate > pow_limit {
        pow_limit
    } else {
        candidate
    }
}

/// Computes the target that `bits` must encode for a header whose parent is
/// at `prev_height` with timestamp `prev_time`.
///
/// Heights at or below the anchor return the anchor's target unchanged
/// (spec §4.5 edge case).
pub fn next_target(prev_height: u64, prev_time: u32, anchor: &AsertAnchor) -> U256 {
    if prev_height <= anchor.anchor_height {
        return anchor.anchor_target;
    }

    let time_diff = BigInt::from(prev_time) - BigInt::from(anchor.anchor_parent_time);
    let height_diff = prev_height - (anchor.anchor_height - 1);
    let target_spacing = BigInt::from(anchor.target_spacing);
    let half_life = BigInt::from(anchor.half_life);

    let ideal_elapsed = &target_spacing * BigInt::from(height_diff + 1);
    let exponent = ((&time_diff - ideal_elapsed) * BigInt::from(65536)) / &half_life;

    // Floor-division shift/frac split so `frac` always lands in [0, 65535),
    // matching the reference ASERT algorithm for negative exponents too.
    let shifts_big = floor_div(&exponent, &BigInt::from(65536));
    let frac = (&exponent - &shifts_big * BigInt::from(65536))
        .to_u64()
        .expect("frac fits in u64 after floor-div normalization");

    let frac_big = BigInt::from(frac);
    let factor = BigInt::from(65536)
        + ((BigInt::from(195_766_423_245_049i64) * &frac_big
            + BigInt::from(971_821_376i64) * &frac_big * &frac_big
            + BigInt::from(5127i64) * &frac_big * &frac_big * &frac_big
            + (BigInt::from(1i64) << 47))
            >> 48);

    let anchor_target = u256_to_bigint(anchor.anchor_target);
    let mut next = anchor_target * factor;

    let shifts = shifts_big - BigInt::from(16);
    if shifts.is_negative() {
        let shift = (-shifts).to_u64().unwrap_or(u64::MAX);
        next >>= shift as usize;
    } else {
        let shift = shifts.to_u64().unwrap_or(u64::MAX);
        next <<= shift as usize;
    }

    bigint_to_u256_clamped(&next, anchor.pow_limit)
}

/// Floor division for signed `BigInt`s (`BigInt`'s `/` truncates toward
/// zero, which is wrong for negative exponents here).
fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    let (q, r) = (a / b, a % b);
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        q - 1
    } else {
        q
    }
}

trait ToU64 {
    fn to_u64(&self) -> Option<u64>;
}

impl ToU64 for BigInt {
    fn to_u64(&self) -> Option<u64> {
        use num_traits::ToPrimitive;
        num_traits::ToPrimitive::to_u64(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn anchor() -> AsertAnchor {
        AsertAnchor {
            anchor_height: 1,
            anchor_parent_time: 0,
            anchor_target: U256::from(1_000_000u64),
            target_spacing: 120,
            half_life: 172_800,
            pow_limit: U256::MAX >> 8,
        }
    }

    #[test]
    fn at_anchor_height_target_is_unchanged() {
        let a = anchor();
        assert_eq!(next_target(1, 0, &a), a.anchor_target);
        assert_eq!(next_target(0, 0, &a), a.anchor_target);
    }

    #[test]
    fn on_schedule_target_is_stable() {
        let a = anchor();
        // prev at height 100, arriving exactly on schedule: target should
        // be very close to the anchor target (within rounding).
        let prev_time = a.target_spacing as u64 * 100;
        let t = next_target(100, prev_time as u32, &a);
        let diff = if t > a.anchor_target { t - a.anchor_target } else { a.anchor_target - t };
        assert!(diff < a.anchor_target / 1000, "expected near-stable target, got {}", t);
    }

    #[test]
    fn blocks_arriving_slower_raise_target() {
        let a = anchor();
        // Way behind schedule: elapsed time is much larger than ideal.
        let prev_time = a.target_spacing as u64 * 100 * 4;
        let t = next_target(100, prev_time as u32, &a);
        assert!(t > a.anchor_target);
    }

    #[test]
    fn blocks_arriving_faster_lower_target() {
        let a = anchor();
        let prev_time = a.target_spacing as u64 * 100 / 4;
        let t = next_target(100, prev_time as u32, &a);
        assert!(t < a.anchor_target);
    }

    #[test]
    fn result_never_exceeds_pow_limit() {
        let mut a = anchor();
        a.pow_limit = U256::from(2_000_000u64);
        let prev_time = a.target_spacing as u64 * 100 * 100;
        let t = next_target(100, prev_time as u32, &a);
        assert!(t <= a.pow_limit);
    }

    quickcheck::quickcheck! {
        // For any height past the anchor and any arrival time (arbitrarily
        // far ahead of or behind schedule), the predicted target is always
        // clamped into `(0, pow_limit]` - it must never be possible to drive
        // the next difficulty to zero or above the network ceiling no
        // matter how skewed the timestamps are.
        fn next_target_always_within_bounds(height_offset: u32, prev_time: u32) -> bool {
            let a = anchor();
            let height = a.anchor_height + 1 + (height_offset as u64 % 1_000_000);
            let t = next_target(height, prev_time, &a);
            t > U256::zero() && t <= a.pow_limit
        }

        // At or below the anchor height, the anchor's own target is
        // returned unchanged regardless of the (here, irrelevant) `prev_time`.
        fn anchor_passthrough_ignores_time(prev_time: u32, height_below_anchor: u8) -> bool {
            let a = anchor();
            let height = height_below_anchor as u64 % (a.anchor_height + 1);
            next_target(height, prev_time, &a) == a.anchor_target
        }
    }
}
