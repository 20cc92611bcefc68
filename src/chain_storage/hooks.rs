//! Fire-and-forget observer hooks (spec §9 design notes).
//!
//! Dispatch happens synchronously, at well-defined points, with the
//! chainstate lock still held (after a successful `set_active_tip`).
//! Subscribers MUST do minimal work and MUST NOT call back into the
//! chainstate.

use crate::blocks::BlockHash;

#[derive(Debug, Clone, Copy)]
pub struct TipChangedEvent {
    pub old_tip: Option<BlockHash>,
    pub new_tip: BlockHash,
    pub new_height: u64,
}

type TipChangedHook = Box<dyn FnMut(&TipChangedEvent) + Send + Sync>;
type BlockConnectedHook = Box<dyn FnMut(BlockHash) + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    on_tip_changed: Vec<TipChangedHook>,
    on_block_connected: Vec<BlockConnectedHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_on_tip_changed_hook<H>(&mut self, hook: H)
    where H: FnMut(&TipChangedEvent) + Send + Sync + 'static {
        self.on_tip_changed.push(Box::new(hook));
    }

    pub fn add_on_block_connected_hook<H>(&mut self, hook: H)
    where H: FnMut(BlockHash) + Send + Sync + 'static {
        self.on_block_connected.push(Box::new(hook));
    }

    pub(crate) fn call_on_tip_changed_hooks(&mut self, event: &TipChangedEvent) {
        for hook in &mut self.on_tip_changed {
            hook(event);
        }
    }

    pub(crate) fn call_on_block_connected_hooks(&mut self, hash: BlockHash) {
        for hook in &mut self.on_block_connected {
            hook(hash);
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_tip_changed", &self.on_tip_changed.len())
            .field("on_block_connected", &self.on_block_connected.len())
            .finish()
    }
}
