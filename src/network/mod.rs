//! Network Module Implementation
//!
//! Byte links with no framing knowledge, built on tokio's async I/O
//! primitives.
//!
//! # Components
//!
//! - `Connection`: the transport contract (send, receive, close, identity)
//! - `StreamConnection`: any pair of async read/write halves
//! - `TcpConnection` / `TcpListener`: stream sockets
//! - `UdpConnection`: a datagram socket fixed to one peer
//! - `SerialConnection`: a serial device
//!
//! Framing happens one layer up, in `codec` and `runtime::Peer`.

pub use connection::{Connection, EndpointDescriptor};
pub use listener::Listener;
pub use serial::SerialConnection;
pub use stream::StreamConnection;
pub use tcp::{TcpConnection, TcpListener};
pub use udp::UdpConnection;

mod connection;
mod listener;
mod serial;
mod stream;
mod tcp;
mod udp;
