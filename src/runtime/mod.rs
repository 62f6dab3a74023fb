pub use manager::ConnectionManager;
pub use peer::{Peer, PeerState};

mod manager;
mod peer;
