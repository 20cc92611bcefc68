use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("payload length {0} exceeds the {1} byte cap")]
    OversizedMessage(u32, u32),
    #[error("compact size value {0} exceeds the {1} cap")]
    NonCanonicalCompactSize(u64, u64),
    #[error("unexpected end of buffer")]
    UnexpectedEof,
}
