use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::codec::{Frame, FrameCodec};
use crate::diagnostics::FrameTap;
use crate::network::Listener;
use crate::runtime::{ConnectionManager, Peer};
use crate::AppError;
use crate::AppResult;

use super::PeerConfig;

/// Application callback for decoded frames.
///
/// Invoked once per frame, in order, on the task that owns the peer. The
/// peer is handed over so the handler can reply.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    async fn on_frame(&self, peer: &Peer, frame: Frame);
}

/// Replies to every frame with `ACK: ` followed by the received payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct AckHandler;

#[async_trait]
impl FrameHandler for AckHandler {
    async fn on_frame(&self, peer: &Peer, frame: Frame) {
        debug!(
            "received {} from {}",
            String::from_utf8_lossy(&frame),
            peer.remote_identity()
        );
        let mut reply = Vec::with_capacity(frame.len() + 5);
        reply.extend_from_slice(b"ACK: ");
        reply.extend_from_slice(&frame);
        if let Err(e) = peer.send(&reply).await {
            error!("Failed to send reply to {}: {}", peer.remote_identity(), e);
        }
    }
}

/// Accept loop that runs one [`Peer`] per inbound connection.
pub struct Server {
    listener: Box<dyn Listener>,
    codec: Arc<dyn FrameCodec>,
    manager: Arc<ConnectionManager>,
    limit_connections: Arc<Semaphore>,
    peer_config: PeerConfig,
    tap: Option<Arc<dyn FrameTap>>,
}

impl Server {
    /// `listener` must already be started.
    pub fn new(
        listener: Box<dyn Listener>,
        codec: Arc<dyn FrameCodec>,
        manager: Arc<ConnectionManager>,
        max_connection: usize,
    ) -> Self {
        Server {
            listener,
            codec,
            manager,
            limit_connections: Arc::new(Semaphore::new(max_connection.max(1))),
            peer_config: PeerConfig::default(),
            tap: None,
        }
    }

    pub fn with_peer_config(mut self, peer_config: PeerConfig) -> Self {
        self.peer_config = peer_config;
        self
    }

    pub fn with_tap(mut self, tap: Arc<dyn FrameTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Accepts connections until `cancel` fires or accepting fails for good.
    ///
    /// A permit is taken per connection to cap concurrency. Each connection
    /// is registered with the manager and driven by its own peer task with a
    /// child token of `cancel`.
    ///
    // Shutdown order:
    // 1. the accept loop stops and the listener is closed
    // 2. every registered connection is closed, which ends the peer loops
    // 3. run returns once all peer tasks are gone
    #[tracing::instrument(skip_all)]
    pub async fn run<H: FrameHandler>(
        &mut self,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        let tracker = TaskTracker::new();

        let result = loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                permit = self.limit_connections.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => break Err(AppError::IllegalStateError(format!(
                        "connection limiter closed: {}",
                        e
                    ))),
                },
            };

            debug!("accept new connection");

            let connection = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                res = self.listener.accept() => match res {
                    Ok(connection) => connection,
                    Err(e) => break Err(e),
                },
            };

            let connection_id = self.manager.add(connection.clone());
            info!(
                "connection {} from {} accepted",
                connection_id,
                connection.remote_identity()
            );

            let mut peer = Peer::with_config(connection, self.codec.clone(), &self.peer_config);
            if let Some(tap) = &self.tap {
                peer = peer.with_tap(tap.clone());
            }
            let peer = Arc::new(peer);
            let handler = handler.clone();
            let manager = self.manager.clone();
            let peer_cancel = cancel.child_token();

            tracker.spawn(async move {
                let frame_peer = peer.clone();
                let result = peer
                    .receive_loop(
                        move |frame| {
                            let handler = handler.clone();
                            let peer = frame_peer.clone();
                            async move { handler.on_frame(&peer, frame).await }
                        },
                        peer_cancel,
                    )
                    .await;
                if let Err(err) = result {
                    error!("Connection error: {:?}", err);
                }
                // whether gracefully or unexpectedly closed, release connection
                manager.remove(connection_id);
                drop(permit);
                debug!("connection {} released", connection_id);
            });
        };

        self.listener.close().await;
        self.manager.close_all().await;
        tracker.close();
        tracker.wait().await;
        info!("server stopped");
        result
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("server dropped");
    }
}
