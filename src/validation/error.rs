use thiserror::Error;

/// Typed rejects from the three validation layers (spec §4.2, §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("stored PoW commitment does not meet the claimed target")]
    InvalidPowCommitment,
    #[error("full RandomX verification failed")]
    InvalidPow,
    #[error("block version must be >= 1, got {0}")]
    InvalidVersion(i32),
    #[error("timestamp {time} is not strictly greater than median time past {mtp}")]
    TimeTooOld { time: u32, mtp: u32 },
    #[error("timestamp {time} exceeds network-adjusted time + max future drift ({limit})")]
    TimeTooNew { time: u32, limit: u32 },
    #[error("bits {actual:08x} does not match ASERT-predicted {expected:08x}")]
    BadDifficulty { expected: u32, actual: u32 },
}

impl From<crate::proof_of_work::PowError> for ValidationError {
    fn from(e: crate::proof_of_work::PowError) -> Self {
        match e {
            crate::proof_of_work::PowError::InvalidPowCommitment => ValidationError::InvalidPowCommitment,
            crate::proof_of_work::PowError::InvalidPow | crate::proof_of_work::PowError::RandomXEngine(_) => {
                ValidationError::InvalidPow
            },
        }
    }
}
