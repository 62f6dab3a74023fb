use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::network::stream::aborted_locally;
use crate::network::{Connection, EndpointDescriptor};
use crate::{AppError, AppResult};

/// A UDP socket fixed to one remote peer.
///
/// Each `send` is one datagram and each `receive` returns at most one
/// datagram; no reassembly is added on top of what the transport gives.
/// Empty datagrams are skipped so a zero-length read keeps meaning "closed".
#[derive(Debug)]
pub struct UdpConnection {
    remote: EndpointDescriptor,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    closed: CancellationToken,
}

impl UdpConnection {
    /// Binds `local` and connects it to `remote`.
    pub async fn connect(local: SocketAddr, remote: SocketAddr) -> AppResult<UdpConnection> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        UdpConnection::from_socket(socket)
    }

    /// Wraps a socket that has already been connected.
    pub fn from_socket(socket: UdpSocket) -> AppResult<UdpConnection> {
        let remote = socket.peer_addr()?;
        debug!(
            "udp pseudo-connection {} -> {}",
            socket.local_addr()?,
            remote
        );
        Ok(UdpConnection {
            remote: remote.into(),
            socket: Mutex::new(Some(Arc::new(socket))),
            closed: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    fn socket(&self) -> AppResult<Arc<UdpSocket>> {
        if self.closed.is_cancelled() {
            return Err(self.use_after_close());
        }
        self.socket
            .lock()
            .clone()
            .ok_or_else(|| self.use_after_close())
    }

    fn use_after_close(&self) -> AppError {
        AppError::UseAfterClose(format!("udp connection to {}", self.remote))
    }
}

#[async_trait]
impl Connection for UdpConnection {
    fn remote_identity(&self) -> &EndpointDescriptor {
        &self.remote
    }

    async fn send(&self, data: &[u8]) -> AppResult<()> {
        let socket = self.socket()?;
        let sent = tokio::select! {
            _ = self.closed.cancelled() => return Err(aborted_locally()),
            res = socket.send(data) => res?,
        };
        if sent != data.len() {
            return Err(AppError::DetailedIoError(format!(
                "datagram to {} truncated: sent {} of {} bytes",
                self.remote,
                sent,
                data.len()
            )));
        }
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize> {
        let socket = self.socket()?;
        loop {
            let read = tokio::select! {
                _ = self.closed.cancelled() => return Err(aborted_locally()),
                res = socket.recv(buf) => res?,
            };
            if read == 0 && !buf.is_empty() {
                trace!("skipping empty datagram from {}", self.remote);
                continue;
            }
            return Ok(read);
        }
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        self.socket.lock().take();
        debug!("udp connection to {} closed", self.remote);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
