use crate::common::time::median_time_past;
use crate::validation::error::ValidationError;

/// Layer 3 timestamp checks (spec §4.2, §4.6): strictly greater than MTP,
/// no more than `max_future_secs` ahead of network-adjusted time.
pub fn check_timestamp(
    time: u32,
    ancestor_times: &[u32],
    adjusted_now: i64,
    max_future_secs: i64,
) -> Result<(), ValidationError> {
    let mtp = median_time_past(ancestor_times);
    if time <= mtp {
        return Err(ValidationError::TimeTooOld { time, mtp });
    }
    let limit = adjusted_now + max_future_secs;
    if (time as i64) > limit {
        return Err(ValidationError::TimeTooNew { time, limit: limit as u32 });
    }
    Ok(())
}
