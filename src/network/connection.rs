use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;

use crate::AppResult;

/// Identity of the far end of a connection, used for logging and dumps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointDescriptor {
    Socket(SocketAddr),
    /// Serial links have no network address; the identity is synthesized
    /// from the device name and line speed.
    Serial { port_name: String, baud_rate: u32 },
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointDescriptor::Socket(addr) => write!(f, "{}", addr),
            EndpointDescriptor::Serial {
                port_name,
                baud_rate,
            } => write!(f, "SERIAL:{}@{}", port_name, baud_rate),
        }
    }
}

impl From<SocketAddr> for EndpointDescriptor {
    fn from(addr: SocketAddr) -> Self {
        EndpointDescriptor::Socket(addr)
    }
}

/// A bidirectional byte link with no framing knowledge.
///
/// Reads and writes take `&self` so one task can sit in `receive` while
/// another calls `send`. Concurrent `send` calls are not arbitrated: callers
/// that share a connection for writing must serialize among themselves.
///
/// After `close`, both `send` and `receive` fail with
/// [`AppError::UseAfterClose`](crate::AppError::UseAfterClose). A `receive`
/// already in flight when `close` runs is woken with
/// [`AppError::OperationAborted`](crate::AppError::OperationAborted).
#[async_trait]
pub trait Connection: Send + Sync {
    fn remote_identity(&self) -> &EndpointDescriptor;

    /// Writes all of `data` and flushes it to the OS before returning.
    async fn send(&self, data: &[u8]) -> AppResult<()>;

    /// Reads at least one and at most `buf.len()` bytes. `Ok(0)` means the
    /// counterpart closed the link in an orderly way.
    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize>;

    /// Idempotent orderly shutdown. The OS handle is released exactly once.
    async fn close(&self) -> AppResult<()>;

    fn is_closed(&self) -> bool;
}
