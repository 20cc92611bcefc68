//! The Bitcoin-style wire protocol: message envelope, CompactSize integers,
//! and the payload messages this core consumes/produces (spec §6.1).
//!
//! The TCP transport, socket multiplexing, and message framing/deframing
//! are out of scope (spec §1) - this module only encodes and decodes the
//! bytes once a complete payload has been delivered.

pub mod compact_size;
pub mod envelope;
pub mod error;
pub mod messages;

pub use envelope::MessageEnvelope;
pub use error::WireError;
pub use messages::{
    GetHeadersMessage, HeadersMessage, InvItem, InvMessage, NetAddr, PingMessage, PongMessage, VersionMessage,
};
