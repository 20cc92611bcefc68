//! The header-sync state machine: designates a sync peer, feeds `headers`
//! messages through [`ChainState::accept_header`], and turns the results
//! into misbehavior reports (spec §4.7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::*;

use crate::chain_storage::{AcceptHeaderReject, ChainState};
use crate::common::PeerId;
use crate::sync::ban::{BanDecision, MisbehaviorReason, PeerRegistry};
use crate::sync::config::HeaderSyncConfig;
use crate::sync::header_sync::error::SyncProtocolError;
use crate::wire::HeadersMessage;

const LOG_TARGET: &str = "chainbase::sync::header_sync";

/// No peer currently holds the sync slot.
const NO_SYNC_PEER: u64 = u64::MAX;

/// What the caller should do after feeding a `headers` message through the
/// state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The message carried no headers we didn't already have; nothing to do.
    UpToDate,
    /// At least one header was accepted. `request_more` is set when the
    /// batch was exactly at the per-message cap, implying the peer likely
    /// has more (spec §4.7) - the caller should send another `getheaders`
    /// built from [`ChainState::build_locator`].
    Accepted { request_more: bool },
    /// The peer misbehaved; `decision` says whether to disconnect.
    Misbehavior { reason: MisbehaviorReason, decision: BanDecision },
}

/// Coordinates header sync against a single [`ChainState`]. Cheap to clone
/// via `Arc` at the call site; holds only atomics and the peer registry
/// internally so it can be shared across connection tasks without an outer
/// lock.
pub struct SyncManager {
    chain: Arc<ChainState>,
    registry: PeerRegistry,
    config: HeaderSyncConfig,
    sync_peer: AtomicU64,
    sync_started_at: AtomicU64,
    last_headers_received_at: AtomicU64,
}

impl SyncManager {
    pub fn new(chain: Arc<ChainState>, config: HeaderSyncConfig) -> Self {
        Self {
            chain,
            registry: PeerRegistry::new(config.clone()),
            config,
            sync_peer: AtomicU64::new(NO_SYNC_PEER),
            sync_started_at: AtomicU64::new(0),
            last_headers_received_at: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn current_sync_peer(&self) -> Option<PeerId> {
        match self.sync_peer.load(Ordering::SeqCst) {
            NO_SYNC_PEER => None,
            id => Some(PeerId::new(id)),
        }
    }

    /// Atomically claims the sync-peer slot if it is free. Returns `true`
    /// iff `peer` now holds it.
    pub fn try_begin_sync(&self, peer: PeerId, now: u64) -> bool {
        let claimed = self
            .sync_peer
            .compare_exchange(NO_SYNC_PEER, peer.as_u64(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            self.sync_started_at.store(now, Ordering::SeqCst);
            self.last_headers_received_at.store(now, Ordering::SeqCst);
            debug!(target: LOG_TARGET, "{} designated as sync peer", peer);
        }
        claimed
    }

    /// Releases the sync-peer slot if `peer` currently holds it.
    pub fn end_sync(&self, peer: PeerId) {
        let _ = self.sync_peer.compare_exchange(
            peer.as_u64(),
            NO_SYNC_PEER,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Clears the sync-peer slot if it has been idle past
    /// [`HeaderSyncConfig::sync_peer_timeout`], returning the peer that was
    /// evicted so the caller can disconnect/reassign it.
    pub fn check_sync_timeout(&self, now: u64) -> Option<PeerId> {
        let current = self.sync_peer.load(Ordering::SeqCst);
        if current == NO_SYNC_PEER {
            return None;
        }
        let last = self.last_headers_received_at.load(Ordering::SeqCst);
        if now.saturating_sub(last) < self.config.sync_peer_timeout.as_secs() {
            return None;
        }
        if self
            .sync_peer
            .compare_exchange(current, NO_SYNC_PEER, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!(target: LOG_TARGET, "sync peer#{} timed out, clearing slot", current);
            Some(PeerId::new(current))
        } else {
            None
        }
    }

    fn touch(&self, now: u64) {
        self.last_headers_received_at.store(now, Ordering::SeqCst);
    }

    /// Spec §4.7 processing of an inbound `headers` message.
    pub fn process_headers_message(
        &self,
        peer: PeerId,
        msg: &HeadersMessage,
        now: u64,
    ) -> Result<SyncOutcome, SyncProtocolError> {
        if msg.headers.len() > self.config.max_headers_per_message {
            let decision = self.registry.report(peer, MisbehaviorReason::OversizedMessage);
            let err = SyncProtocolError::OversizedHeadersMessage {
                peer,
                count: msg.headers.len(),
                limit: self.config.max_headers_per_message,
            };
            debug!(target: LOG_TARGET, "{}: {} ({:?})", peer, err, decision);
            return Err(err);
        }

        if msg.headers.is_empty() {
            return Ok(SyncOutcome::UpToDate);
        }

        for pair in msg.headers.windows(2) {
            if pair[1].prev_hash != pair[0].hash() {
                let decision = self.registry.report(peer, MisbehaviorReason::NonContinuousHeaders);
                return Ok(SyncOutcome::Misbehavior { reason: MisbehaviorReason::NonContinuousHeaders, decision });
            }
        }

        for header in &msg.headers {
            let target = crate::blocks::bits_to_target(header.bits);
            if crate::validation::layer1_prefilter(header, target).is_err() {
                // Spec §4.7 step 3: a single bad commitment anywhere in the
                // batch condemns the whole batch before any of it reaches
                // `accept_header` - none of it is inserted into the index.
                let decision = self.registry.report(peer, MisbehaviorReason::InvalidPow);
                return Ok(SyncOutcome::Misbehavior { reason: MisbehaviorReason::InvalidPow, decision });
            }
        }

        if self.current_sync_peer() == Some(peer) {
            self.touch(now);
        }

        let mut accepted_any = false;
        for header in &msg.headers {
            match self.chain.accept_header(header.clone(), peer, now) {
                Ok(_hash) => {
                    accepted_any = true;
                    self.registry.decay_unconnecting(peer);
                },
                Err(AcceptHeaderReject::InvalidPowCommitment) | Err(AcceptHeaderReject::InvalidPow) => {
                    let decision = self.registry.report(peer, MisbehaviorReason::InvalidPow);
                    return Ok(SyncOutcome::Misbehavior { reason: MisbehaviorReason::InvalidPow, decision });
                },
                Err(AcceptHeaderReject::Orphan(_)) => {
                    self.registry.record_unconnecting(peer);
                    if self.registry.unconnecting_count(peer) >= self.config.unconnecting_limit {
                        let decision = self.registry.report(peer, MisbehaviorReason::TooManyUnconnecting);
                        return Ok(SyncOutcome::Misbehavior {
                            reason: MisbehaviorReason::TooManyUnconnecting,
                            decision,
                        });
                    }
                    if self.chain.orphan_count_for_peer(peer) >= crate::chain_storage::orphan::MAX_ORPHANS_PER_PEER {
                        let decision = self.registry.report(peer, MisbehaviorReason::TooManyOrphans);
                        return Ok(SyncOutcome::Misbehavior { reason: MisbehaviorReason::TooManyOrphans, decision });
                    }
                    // Further headers in this batch almost certainly chain from
                    // an orphan too; stop and wait for the parent instead of
                    // trying each one against an unknown tree.
                    break;
                },
                Err(_other) => {
                    let decision = self.registry.report(peer, MisbehaviorReason::NonContinuousHeaders);
                    return Ok(SyncOutcome::Misbehavior { reason: MisbehaviorReason::NonContinuousHeaders, decision });
                },
            }
        }

        if accepted_any && !self.chain.is_initial_sync(now) {
            if let Some(tip) = self.chain.get_tip() {
                if tip.accumulated_difficulty < self.config.minimum_chain_work {
                    let decision = self.registry.report(peer, MisbehaviorReason::LowWorkHeaders);
                    return Ok(SyncOutcome::Misbehavior { reason: MisbehaviorReason::LowWorkHeaders, decision });
                }
            }
        }

        Ok(SyncOutcome::Accepted { request_more: msg.headers.len() == self.config.max_headers_per_message })
    }

    /// Builds the `getheaders` locator for the current tip (spec §3.3).
    pub fn build_locator(&self) -> Vec<crate::blocks::BlockHash> {
        self.chain.build_locator()
    }

    pub fn sync_peer_timeout(&self) -> Duration {
        self.config.sync_peer_timeout
    }

    /// When the current sync peer was designated, if any (seconds, same
    /// clock as the `now` passed to `try_begin_sync`).
    pub fn sync_started_at(&self) -> Option<u64> {
        if self.sync_peer.load(Ordering::SeqCst) == NO_SYNC_PEER {
            None
        } else {
            Some(self.sync_started_at.load(Ordering::SeqCst))
        }
    }
}
