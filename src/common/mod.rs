pub mod peer_id;
pub mod rolling_vec;
pub mod time;

pub use peer_id::PeerId;
pub use rolling_vec::RollingVec;
pub use time::{median_time_past, NetworkTimeOffset};
