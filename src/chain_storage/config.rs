use std::time::Duration;

/// Ambient, non-consensus tunables for the chainstate orchestrator. These
/// may be changed freely between nodes without splitting the network,
/// unlike [`crate::consensus::ConsensusParams`].
#[derive(Debug, Clone)]
pub struct ChainStateConfig {
    /// Reorg depth beyond which a reorg halts instead of proceeding. Zero
    /// disables the guard. Ambient rather than consensus-critical: nodes
    /// may run with different values without splitting the network, since
    /// the guard only ever keeps a node from following a valid chain, never
    /// makes it accept an invalid one.
    pub suspicious_reorg_depth: u64,
    /// How often the header store is persisted in the background.
    pub persistence_interval: Duration,
    /// Optional known-good (height, hash) pairs. A header at a checkpointed
    /// height whose hash mismatches is rejected outright; forks older than
    /// the last checkpoint are never reorg candidates.
    pub checkpoints: Vec<(u64, crate::blocks::BlockHash)>,
}

impl Default for ChainStateConfig {
    fn default() -> Self {
        Self {
            suspicious_reorg_depth: 0,
            persistence_interval: Duration::from_secs(600),
            checkpoints: Vec::new(),
        }
    }
}
