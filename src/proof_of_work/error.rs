use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowError {
    #[error("stored PoW commitment does not meet the claimed target")]
    InvalidPowCommitment,
    #[error("full RandomX verification failed")]
    InvalidPow,
    #[error("randomx engine error: {0}")]
    RandomXEngine(String),
}
