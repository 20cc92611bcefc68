//! Peer-facing header sync: misbehavior scoring, sync-peer designation, and
//! the `getheaders`/`headers` exchange driving [`crate::chain_storage::ChainState`]
//! (spec §4.7).
//!
//! This module knows nothing about sockets or message framing - it consumes
//! already-decoded [`crate::wire`] payloads and calls back into chainstate;
//! the transport and peer discovery layers are external to this crate.

pub mod ban;
pub mod config;
pub mod header_sync;
pub mod peer_state;

pub use ban::{BanDecision, MisbehaviorReason, PeerRegistry};
pub use config::{HeaderSyncConfig, MisbehaviorPoints};
pub use header_sync::{SyncManager, SyncOutcome, SyncProtocolError};
pub use peer_state::PeerSyncState;
