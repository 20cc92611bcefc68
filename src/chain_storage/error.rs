use thiserror::Error;

use crate::blocks::BlockHash;
use crate::proof_of_work::PowError;

/// Reasons `accept_header` can refuse a header (spec §7). A reject is not
/// necessarily an error in the exceptional sense - several of these are
/// routine (`Orphan`, `DuplicateValid`) and the sync layer decides what, if
/// anything, to do about each kind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcceptHeaderReject {
    #[error("header descends from a hash in the failed set")]
    InvalidAncestor,
    #[error("stored PoW commitment does not meet the claimed target")]
    InvalidPowCommitment,
    #[error("full RandomX verification failed")]
    InvalidPow,
    #[error("block version must be >= 1")]
    InvalidVersion,
    #[error("genesis candidate does not match the configured genesis hash")]
    BadGenesis,
    #[error("parent header {0} is not yet known")]
    Orphan(BlockHash),
    #[error("timestamp is not strictly greater than median time past")]
    TimeTooOld,
    #[error("timestamp exceeds network-adjusted time + max future drift")]
    TimeTooNew,
    #[error("bits does not match the ASERT-predicted difficulty")]
    BadDifficulty,
    #[error("hash at a checkpointed height does not match the checkpoint")]
    CheckpointMismatch,
}

impl From<PowError> for AcceptHeaderReject {
    fn from(e: PowError) -> Self {
        match e {
            PowError::InvalidPowCommitment => AcceptHeaderReject::InvalidPowCommitment,
            PowError::InvalidPow | PowError::RandomXEngine(_) => AcceptHeaderReject::InvalidPow,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainStateError {
    #[error("no common ancestor between current tip and candidate")]
    NoCommonAncestor,
    #[error("reorg depth {depth} exceeds the suspicious-reorg threshold {threshold}")]
    SuspiciousReorgDepthExceeded { depth: u64, threshold: u64 },
    #[error("unknown block hash {0}")]
    UnknownHash(BlockHash),
}
