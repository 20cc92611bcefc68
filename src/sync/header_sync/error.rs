use thiserror::Error;

use crate::common::PeerId;

/// Protocol-level problems a header-sync exchange can hit (spec §7). These
/// are distinct from [`crate::chain_storage::AcceptHeaderReject`]: that enum
/// reasons about a single header against consensus state, this one reasons
/// about an entire message or session against the sync protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncProtocolError {
    #[error("headers message from {peer} carried {count} headers, over the {limit} cap")]
    OversizedHeadersMessage { peer: PeerId, count: usize, limit: usize },
    #[error("headers message from {0} was empty")]
    EmptyHeadersMessage(PeerId),
    #[error("headers from {0} did not chain continuously (batch[i].prev_hash != batch[i-1].hash())")]
    NonContinuousBatch(PeerId),
    #[error("{0} is not the designated sync peer")]
    NotSyncPeer(PeerId),
    #[error("sync peer {0} timed out waiting for headers")]
    SyncPeerTimedOut(PeerId),
}
