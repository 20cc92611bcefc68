pub mod error;
pub mod synchronizer;

pub use error::SyncProtocolError;
pub use synchronizer::{SyncManager, SyncOutcome};
