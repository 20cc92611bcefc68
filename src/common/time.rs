//! Median Time Past and network-adjusted time (spec §4.6).

use std::collections::VecDeque;

/// Width of the window used to clamp the peer-time offset, in seconds (70 minutes).
const OFFSET_CLAMP_SECS: i64 = 70 * 60;

/// Minimum number of peer samples required before an offset is trusted.
const MIN_SAMPLES: usize = 5;

/// Maximum number of peer time samples retained.
const MAX_SAMPLES: usize = 200;

/// Computes the median of up to the last 11 ancestor timestamps.
///
/// `times` is expected to be supplied oldest-first or newest-first; the
/// median is order-independent. Callers walk `prev` to gather at most 11
/// ancestors (fewer at shallow heights) and pass them here - this function
/// performs no tree walking itself.
pub fn median_time_past(times: &[u32]) -> u32 {
    let mut sorted: Vec<u32> = times.to_vec();
    sorted.sort_unstable();
    let len = sorted.len();
    if len == 0 {
        return 0;
    }
    sorted[len / 2]
}

/// Tracks peer-reported time offsets and derives the network-adjusted
/// current time used by Layer 3 future-time checks.
#[derive(Debug, Default, Clone)]
pub struct NetworkTimeOffset {
    samples: VecDeque<i64>,
}

impl NetworkTimeOffset {
    pub fn new() -> Self {
        Self { samples: VecDeque::new() }
    }

    /// Records a single `peer_reported_time - local_time` sample from a
    /// verified peer handshake.
    pub fn add_sample(&mut self, peer_time: i64, local_time: i64) {
        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(peer_time - local_time);
    }

    /// The clamped median offset, or zero if fewer than [`MIN_SAMPLES`] exist.
    pub fn offset(&self) -> i64 {
        if self.samples.len() < MIN_SAMPLES {
            return 0;
        }
        let mut sorted: Vec<i64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let median = sorted[sorted.len() / 2];
        median.clamp(-OFFSET_CLAMP_SECS, OFFSET_CLAMP_SECS)
    }

    /// Applies the current offset to `local_time` to produce the
    /// network-adjusted time used for the max-future-time check.
    pub fn adjusted_time(&self, local_time: i64) -> i64 {
        local_time + self.offset()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mtp_odd_count() {
        assert_eq!(median_time_past(&[10, 30, 20]), 20);
    }

    #[test]
    fn mtp_even_count_takes_upper_median() {
        assert_eq!(median_time_past(&[10, 20, 30, 40]), 30);
    }

    #[test]
    fn mtp_empty_is_zero() {
        assert_eq!(median_time_past(&[]), 0);
    }

    #[test]
    fn offset_zero_below_min_samples() {
        let mut o = NetworkTimeOffset::new();
        for _ in 0..4 {
            o.add_sample(1100, 1000);
        }
        assert_eq!(o.offset(), 0);
    }

    #[test]
    fn offset_clamped() {
        let mut o = NetworkTimeOffset::new();
        for _ in 0..5 {
            o.add_sample(1_000_000, 0);
        }
        assert_eq!(o.offset(), OFFSET_CLAMP_SECS);
    }

    #[test]
    fn offset_applies_to_local_time() {
        let mut o = NetworkTimeOffset::new();
        for _ in 0..5 {
            o.add_sample(1100, 1000);
        }
        assert_eq!(o.offset(), 100);
        assert_eq!(o.adjusted_time(5000), 5100);
    }
}
