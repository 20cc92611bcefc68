//! Payload messages the core consumes/produces (spec §6.1).
//!
//! Encoding/decoding only; the envelope (magic, command, checksum) and the
//! transport that frames these payloads live in [`crate::wire::envelope`]
//! and outside this crate respectively.

use std::convert::TryInto;

use crate::blocks::{BlockHash, BlockHeader, HEADER_SIZE};
use crate::wire::compact_size;
use crate::wire::error::WireError;

/// Max `locator` entries in a `getheaders` message (spec §6.5).
pub const MAX_LOCATOR_ENTRIES: usize = 101;
/// Max headers in a single `headers` message (spec §6.5).
pub const MAX_HEADERS_PER_MESSAGE: usize = 2000;
/// Max inventory items in a single `inv` message (spec §6.1).
pub const MAX_INV_PER_MESSAGE: usize = 50_000;

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], WireError> {
    if buf.len() < len {
        return Err(WireError::UnexpectedEof);
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn read_u16(buf: &mut &[u8]) -> Result<u16, WireError> {
    Ok(u16::from_le_bytes(take(buf, 2)?.try_into().unwrap()))
}

fn read_u32(buf: &mut &[u8]) -> Result<u32, WireError> {
    Ok(u32::from_le_bytes(take(buf, 4)?.try_into().unwrap()))
}

fn read_i32(buf: &mut &[u8]) -> Result<i32, WireError> {
    Ok(i32::from_le_bytes(take(buf, 4)?.try_into().unwrap()))
}

fn read_u64(buf: &mut &[u8]) -> Result<u64, WireError> {
    Ok(u64::from_le_bytes(take(buf, 8)?.try_into().unwrap()))
}

fn read_i64(buf: &mut &[u8]) -> Result<i64, WireError> {
    Ok(i64::from_le_bytes(take(buf, 8)?.try_into().unwrap()))
}

fn read_hash(buf: &mut &[u8]) -> Result<BlockHash, WireError> {
    let bytes: [u8; 32] = take(buf, 32)?.try_into().unwrap();
    Ok(BlockHash::from_bytes(bytes))
}

fn read_compact_size(buf: &mut &[u8]) -> Result<u64, WireError> {
    let (value, consumed) = compact_size::decode(buf)?;
    *buf = &buf[consumed..];
    Ok(value)
}

fn read_varstr(buf: &mut &[u8]) -> Result<String, WireError> {
    let len = read_compact_size(buf)?;
    let bytes = take(buf, len as usize)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| WireError::MalformedMessage(e.to_string()))
}

fn write_varstr(out: &mut Vec<u8>, s: &str) {
    compact_size::encode(s.len() as u64, out);
    out.extend_from_slice(s.as_bytes());
}

/// A 26-byte network address: 8B services + 16B IPv6 (IPv4 v4-mapped) + 2B
/// big-endian port (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddr {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddr {
    pub const SIZE: usize = 26;

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.ip);
        out.extend_from_slice(&self.port.to_be_bytes());
    }

    pub fn deserialize(buf: &mut &[u8]) -> Result<Self, WireError> {
        let services = read_u64(buf)?;
        let ip: [u8; 16] = take(buf, 16)?.try_into().unwrap();
        let port = u16::from_be_bytes(take(buf, 2)?.try_into().unwrap());
        Ok(Self { services, ip, port })
    }
}

/// `version` message payload (spec §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetAddr,
    pub addr_from: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
}

impl VersionMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        self.addr_recv.serialize(&mut out);
        self.addr_from.serialize(&mut out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        write_varstr(&mut out, &self.user_agent);
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = buf;
        let version = read_i32(&mut cursor)?;
        let services = read_u64(&mut cursor)?;
        let timestamp = read_i64(&mut cursor)?;
        let addr_recv = NetAddr::deserialize(&mut cursor)?;
        let addr_from = NetAddr::deserialize(&mut cursor)?;
        let nonce = read_u64(&mut cursor)?;
        let user_agent = read_varstr(&mut cursor)?;
        let start_height = read_i32(&mut cursor)?;
        Ok(Self { version, services, timestamp, addr_recv, addr_from, nonce, user_agent, start_height })
    }
}

/// `ping`/`pong` payload: an 8-byte nonce (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage {
    pub nonce: u64,
}

impl PingMessage {
    pub fn serialize(&self) -> [u8; 8] {
        self.nonce.to_le_bytes()
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = buf;
        Ok(Self { nonce: read_u64(&mut cursor)? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage {
    pub nonce: u64,
}

impl PongMessage {
    pub fn serialize(&self) -> [u8; 8] {
        self.nonce.to_le_bytes()
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = buf;
        Ok(Self { nonce: read_u64(&mut cursor)? })
    }
}

/// `getheaders` payload: a block locator plus an optional stop hash (spec
/// §6.1, §3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersMessage {
    pub version: i32,
    pub locator: Vec<BlockHash>,
    pub stop_hash: BlockHash,
}

impl GetHeadersMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        compact_size::encode(self.locator.len() as u64, &mut out);
        for hash in &self.locator {
            out.extend_from_slice(hash.as_bytes());
        }
        out.extend_from_slice(self.stop_hash.as_bytes());
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = buf;
        let version = read_i32(&mut cursor)?;
        let count = read_compact_size(&mut cursor)?;
        if count as usize > MAX_LOCATOR_ENTRIES {
            return Err(WireError::NonCanonicalCompactSize(count, MAX_LOCATOR_ENTRIES as u64));
        }
        let mut locator = Vec::with_capacity(compact_size::safe_capacity_hint(count));
        for _ in 0..count {
            locator.push(read_hash(&mut cursor)?);
        }
        let stop_hash = read_hash(&mut cursor)?;
        Ok(Self { version, locator, stop_hash })
    }
}

/// `headers` payload: a batch of up to [`MAX_HEADERS_PER_MESSAGE`] 100-byte
/// headers (spec §6.1, §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeader>,
}

impl HeadersMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        compact_size::encode(self.headers.len() as u64, &mut out);
        for header in &self.headers {
            out.extend_from_slice(&header.serialize());
        }
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = buf;
        let count = read_compact_size(&mut cursor)?;
        if count as usize > MAX_HEADERS_PER_MESSAGE {
            return Err(WireError::OversizedMessage(count as u32, MAX_HEADERS_PER_MESSAGE as u32));
        }
        let mut headers = Vec::with_capacity(compact_size::safe_capacity_hint(count));
        for _ in 0..count {
            let raw = take(&mut cursor, HEADER_SIZE)?;
            headers.push(BlockHeader::deserialize(raw).map_err(|e| WireError::MalformedMessage(e.to_string()))?);
        }
        Ok(Self { headers })
    }
}

/// A single `inv` entry: a 4-byte type code plus a 32-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvItem {
    pub item_type: u32,
    pub hash: BlockHash,
}

/// `inv` payload: up to [`MAX_INV_PER_MESSAGE`] advertised items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvMessage {
    pub items: Vec<InvItem>,
}

impl InvMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        compact_size::encode(self.items.len() as u64, &mut out);
        for item in &self.items {
            out.extend_from_slice(&item.item_type.to_le_bytes());
            out.extend_from_slice(item.hash.as_bytes());
        }
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut cursor = buf;
        let count = read_compact_size(&mut cursor)?;
        if count as usize > MAX_INV_PER_MESSAGE {
            return Err(WireError::OversizedMessage(count as u32, MAX_INV_PER_MESSAGE as u32));
        }
        let mut items = Vec::with_capacity(compact_size::safe_capacity_hint(count));
        for _ in 0..count {
            let item_type = read_u32(&mut cursor)?;
            let hash = read_hash(&mut cursor)?;
            items.push(InvItem { item_type, hash });
        }
        Ok(Self { items })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_addr() -> NetAddr {
        NetAddr { services: 1, ip: [0u8; 16], port: 8333 }
    }

    #[test]
    fn version_round_trips() {
        let msg = VersionMessage {
            version: 70015,
            services: 1,
            timestamp: 1_700_000_000,
            addr_recv: sample_addr(),
            addr_from: sample_addr(),
            nonce: 42,
            user_agent: "/chainbase:0.1.0/".to_string(),
            start_height: 100,
        };
        let bytes = msg.serialize();
        let decoded = VersionMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn ping_pong_round_trip() {
        let ping = PingMessage { nonce: 7 };
        assert_eq!(PingMessage::deserialize(&ping.serialize()).unwrap(), ping);
        let pong = PongMessage { nonce: 7 };
        assert_eq!(PongMessage::deserialize(&pong.serialize()).unwrap(), pong);
    }

    #[test]
    fn getheaders_round_trips_and_bounds_locator() {
        let msg = GetHeadersMessage {
            version: 1,
            locator: vec![BlockHash::from_bytes([1u8; 32]), BlockHash::from_bytes([2u8; 32])],
            stop_hash: BlockHash::ZERO,
        };
        let bytes = msg.serialize();
        let decoded = GetHeadersMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn getheaders_rejects_oversized_locator() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        compact_size::encode((MAX_LOCATOR_ENTRIES + 1) as u64, &mut bytes);
        assert!(GetHeadersMessage::deserialize(&bytes).is_err());
    }

    #[test]
    fn headers_round_trips() {
        let header = BlockHeader {
            version: 1,
            prev_hash: BlockHash::ZERO,
            miner_address: [0u8; 20],
            time: 0,
            bits: 0x207f_ffff,
            nonce: 0,
            randomx_hash: BlockHash::ZERO,
        };
        let msg = HeadersMessage { headers: vec![header; 3] };
        let bytes = msg.serialize();
        let decoded = HeadersMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn headers_rejects_batch_over_cap() {
        let mut bytes = Vec::new();
        compact_size::encode((MAX_HEADERS_PER_MESSAGE + 1) as u64, &mut bytes);
        assert!(HeadersMessage::deserialize(&bytes).is_err());
    }

    #[test]
    fn inv_round_trips() {
        let msg = InvMessage {
            items: vec![InvItem { item_type: 2, hash: BlockHash::from_bytes([9u8; 32]) }],
        };
        let bytes = msg.serialize();
        let decoded = InvMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
