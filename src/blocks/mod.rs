pub mod header;

pub use header::{
    bits_to_target, double_sha256, target_to_bits, BlockHash, BlockHeader, HeaderDeserializeError, HEADER_SIZE,
};
