//! The 100-byte wire block header (spec §3.1, §6.2).

use std::convert::{TryFrom, TryInto};
use std::fmt;

use primitive_types::U256;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Fixed wire size of a serialized [`BlockHeader`].
pub const HEADER_SIZE: usize = 100;

/// A 256-bit block hash, stored in little-endian internal byte order.
///
/// Display formatting reverses the bytes to match the network's
/// big-endian-looking hex convention, the same convention used for
/// `prev_hash` fields and genesis comparisons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interprets the hash as a 256-bit little-endian integer, for PoW
    /// target comparisons.
    pub fn as_u256(&self) -> U256 {
        U256::from_little_endian(&self.0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl TryFrom<&[u8]> for BlockHash {
    type Error = HeaderDeserializeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != 32 {
            return Err(HeaderDeserializeError::WrongLength { expected: 32, actual: value.len() });
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(value);
        Ok(BlockHash(buf))
    }
}

/// The fixed 100-byte block header. All multi-byte integer fields are
/// little-endian on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: BlockHash,
    pub miner_address: [u8; 20],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub randomx_hash: BlockHash,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderDeserializeError {
    #[error("expected buffer of {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

impl BlockHeader {
    /// Builds the zero-hash genesis parent sentinel header is not provided
    /// here; callers compare `prev_hash.is_zero()` to detect genesis.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut offset = 0;
        buf[offset..offset + 4].copy_from_slice(&self.version.to_le_bytes());
        offset += 4;
        buf[offset..offset + 32].copy_from_slice(self.prev_hash.as_bytes());
        offset += 32;
        buf[offset..offset + 20].copy_from_slice(&self.miner_address);
        offset += 20;
        buf[offset..offset + 4].copy_from_slice(&self.time.to_le_bytes());
        offset += 4;
        buf[offset..offset + 4].copy_from_slice(&self.bits.to_le_bytes());
        offset += 4;
        buf[offset..offset + 4].copy_from_slice(&self.nonce.to_le_bytes());
        offset += 4;
        buf[offset..offset + 32].copy_from_slice(self.randomx_hash.as_bytes());
        offset += 32;
        debug_assert_eq!(offset, HEADER_SIZE);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, HeaderDeserializeError> {
        if buf.len() != HEADER_SIZE {
            return Err(HeaderDeserializeError::WrongLength { expected: HEADER_SIZE, actual: buf.len() });
        }
        let mut offset = 0;
        let version = i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let prev_hash = BlockHash::try_from(&buf[offset..offset + 32])?;
        offset += 32;
        let mut miner_address = [0u8; 20];
        miner_address.copy_from_slice(&buf[offset..offset + 20]);
        offset += 20;
        let time = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let bits = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let nonce = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let randomx_hash = BlockHash::try_from(&buf[offset..offset + 32])?;
        offset += 32;
        debug_assert_eq!(offset, HEADER_SIZE);
        Ok(BlockHeader { version, prev_hash, miner_address, time, bits, nonce, randomx_hash })
    }

    /// The header's own hash: `double_sha256(serialize(header))`.
    pub fn hash(&self) -> BlockHash {
        double_sha256(&self.serialize())
    }

    /// A copy of this header with `randomx_hash` zeroed, used as the input
    /// to PoW computation (the commitment field is not part of its own
    /// hashing input).
    pub fn with_zeroed_pow(&self) -> BlockHeader {
        BlockHeader { randomx_hash: BlockHash::ZERO, ..*self }
    }

    pub fn is_genesis_candidate(&self) -> bool {
        self.prev_hash.is_zero()
    }
}

/// SHA-256 applied twice, the hash function used for block and message
/// checksums throughout the wire protocol.
pub fn double_sha256(data: &[u8]) -> BlockHash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    BlockHash(out)
}

/// Decodes a compact "bits" difficulty encoding into a 256-bit target.
///
/// The encoding is the familiar 3-byte-mantissa-plus-1-byte-exponent form:
/// the low 3 bytes are the mantissa, the high byte is the number of bytes
/// the mantissa should be shifted into from the right.
pub fn bits_to_target(bits: u32) -> U256 {
    let exponent = (bits >> 24) as i32;
    let mantissa = bits & 0x007f_ffff;
    if exponent <= 3 {
        U256::from(mantissa) >> (8 * (3 - exponent)) as usize
    } else {
        U256::from(mantissa) << (8 * (exponent - 3)) as usize
    }
}

/// Encodes a 256-bit target into the compact "bits" form, the inverse of
/// [`bits_to_target`].
pub fn target_to_bits(target: U256) -> u32 {
    if target.is_zero() {
        return 0;
    }
    let mut size = (target.bits() + 7) / 8;
    let mut compact: u64;
    if size <= 3 {
        compact = (target.low_u64()) << (8 * (3 - size));
    } else {
        let shifted = target >> (8 * (size - 3)) as usize;
        compact = shifted.low_u64();
    }
    // If the mantissa's top bit is set it would be interpreted as a sign
    // bit; shift right and bump the exponent to keep it unsigned.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    (compact as u32) | ((size as u32) << 24)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: BlockHash::from_bytes([7u8; 32]),
            miner_address: [9u8; 20],
            time: 1_700_000_000,
            bits: 0x1f00_ffff,
            nonce: 42,
            randomx_hash: BlockHash::from_bytes([3u8; 32]),
        }
    }

    #[test]
    fn round_trip_is_identity() {
        let header = sample_header();
        let bytes = header.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = BlockHeader::deserialize(&bytes).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        let err = BlockHeader::deserialize(&[0u8; 99]).unwrap_err();
        assert_eq!(err, HeaderDeserializeError::WrongLength { expected: 100, actual: 99 });
    }

    #[test]
    fn hash_display_is_byte_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        bytes[31] = 0xCD;
        let hash = BlockHash::from_bytes(bytes);
        let s = format!("{}", hash);
        assert!(s.starts_with("cd"));
        assert!(s.ends_with("ab"));
    }

    #[test]
    fn bits_target_round_trip() {
        for bits in [0x1f00_ffffu32, 0x1d00_ffff, 0x207f_ffff, 0x0300_0001] {
            let target = bits_to_target(bits);
            let back = target_to_bits(target);
            assert_eq!(bits_to_target(back), target, "bits={:08x}", bits);
        }
    }

    #[test]
    fn genesis_candidate_detection() {
        let mut header = sample_header();
        header.prev_hash = BlockHash::ZERO;
        assert!(header.is_genesis_candidate());
    }

    quickcheck::quickcheck! {
        // `bits` is a lossy, non-injective encoding (distinct raw values can
        // decode to the same target), so the only property that holds for
        // *every* u32 is that normalizing twice is the same as normalizing
        // once - not that decode(encode(bits)) == bits.
        fn bits_normalization_is_idempotent(bits: u32) -> bool {
            let once = target_to_bits(bits_to_target(bits));
            let twice = target_to_bits(bits_to_target(once));
            once == twice
        }

        // A target that is itself the decoding of some `bits` value (i.e.
        // already compact-representable, with no precision below its top
        // three significant bytes) survives one more encode/decode cycle
        // unchanged. Arbitrary U256 targets do NOT have this property -
        // compact bits keeps only the top three bytes of the mantissa.
        fn compact_representable_target_round_trips(bits: u32) -> bool {
            let target = bits_to_target(bits);
            bits_to_target(target_to_bits(target)) == target
        }
    }
}
