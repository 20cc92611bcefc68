//! The 24-byte message envelope (spec §6.1).

use std::convert::TryInto;

use crate::blocks::double_sha256;
use crate::wire::error::WireError;

pub const ENVELOPE_SIZE: usize = 24;
pub const COMMAND_SIZE: usize = 12;
/// Payload length MUST be <= this cap.
pub const MAX_PAYLOAD_LEN: u32 = 4_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub magic: u32,
    pub command: [u8; COMMAND_SIZE],
    pub payload_len: u32,
    pub checksum: [u8; 4],
}

impl MessageEnvelope {
    pub fn command_str(&self) -> String {
        let end = self.command.iter().position(|&b| b == 0).unwrap_or(COMMAND_SIZE);
        String::from_utf8_lossy(&self.command[..end]).into_owned()
    }

    pub fn for_payload(magic: u32, command: &str, payload: &[u8]) -> Self {
        let mut command_bytes = [0u8; COMMAND_SIZE];
        let bytes = command.as_bytes();
        let len = bytes.len().min(COMMAND_SIZE);
        command_bytes[..len].copy_from_slice(&bytes[..len]);
        let hash = double_sha256(payload);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash.as_bytes()[..4]);
        Self { magic, command: command_bytes, payload_len: payload.len() as u32, checksum }
    }

    pub fn serialize(&self) -> [u8; ENVELOPE_SIZE] {
        let mut buf = [0u8; ENVELOPE_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..16].copy_from_slice(&self.command);
        buf[16..20].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[20..24].copy_from_slice(&self.checksum);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != ENVELOPE_SIZE {
            return Err(WireError::MalformedMessage(format!("expected {} bytes, got {}", ENVELOPE_SIZE, buf.len())));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut command = [0u8; COMMAND_SIZE];
        command.copy_from_slice(&buf[4..16]);
        let payload_len = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(WireError::OversizedMessage(payload_len, MAX_PAYLOAD_LEN));
        }
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&buf[20..24]);
        Ok(Self { magic, command, payload_len, checksum })
    }

    pub fn verify_checksum(&self, payload: &[u8]) -> Result<(), WireError> {
        let hash = double_sha256(payload);
        if &hash.as_bytes()[..4] == self.checksum {
            Ok(())
        } else {
            Err(WireError::BadChecksum)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips() {
        let payload = b"hello world";
        let env = MessageEnvelope::for_payload(0xD9B4BEF9, "headers", payload);
        let bytes = env.serialize();
        let decoded = MessageEnvelope::deserialize(&bytes).unwrap();
        assert_eq!(env, decoded);
        assert_eq!(decoded.command_str(), "headers");
        assert!(decoded.verify_checksum(payload).is_ok());
    }

    #[test]
    fn rejects_oversized_payload_length() {
        let mut env = MessageEnvelope::for_payload(0, "inv", b"");
        env.payload_len = MAX_PAYLOAD_LEN + 1;
        let bytes = env.serialize();
        assert!(matches!(MessageEnvelope::deserialize(&bytes), Err(WireError::OversizedMessage(_, _))));
    }

    #[test]
    fn detects_checksum_mismatch() {
        let env = MessageEnvelope::for_payload(0, "ping", b"abc");
        assert!(env.verify_checksum(b"xyz").is_err());
    }
}
