// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::codec::{drain_frames, Frame, FrameCodec};
use crate::diagnostics::{Direction, FrameTap};
use crate::network::{Connection, EndpointDescriptor};
use crate::service::PeerConfig;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    Receiving,
    /// The loop ended on cancellation or because the counterpart went away.
    Closed,
    /// The loop ended on a local transport fault.
    Faulted,
}

/// One connection paired with one codec.
///
/// The peer owns the receive buffer and runs the decode-and-dispatch loop.
/// `send` can run concurrently with an active [`receive_loop`](Self::receive_loop);
/// concurrent `send` calls are the caller's to serialize.
pub struct Peer {
    connection: Arc<dyn Connection>,
    codec: Arc<dyn FrameCodec>,
    tap: Option<Arc<dyn FrameTap>>,
    remote: String,
    read_buffer_size: usize,
    // held by the running loop for its whole lifetime
    buffer: Mutex<BytesMut>,
    state: parking_lot::Mutex<PeerState>,
    tx_index: AtomicU64,
}

impl Peer {
    pub fn new(connection: Arc<dyn Connection>, codec: Arc<dyn FrameCodec>) -> Peer {
        Peer::with_config(connection, codec, &PeerConfig::default())
    }

    pub fn with_config(
        connection: Arc<dyn Connection>,
        codec: Arc<dyn FrameCodec>,
        config: &PeerConfig,
    ) -> Peer {
        let remote = connection.remote_identity().to_string();
        Peer {
            connection,
            codec,
            tap: None,
            remote,
            read_buffer_size: config.read_buffer_size.max(1),
            buffer: Mutex::new(BytesMut::with_capacity(config.initial_buffer_capacity)),
            state: parking_lot::Mutex::new(PeerState::Idle),
            tx_index: AtomicU64::new(0),
        }
    }

    /// Installs a tap that sees every received and sent frame.
    pub fn with_tap(mut self, tap: Arc<dyn FrameTap>) -> Peer {
        self.tap = Some(tap);
        self
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn remote_identity(&self) -> &EndpointDescriptor {
        self.connection.remote_identity()
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock()
    }

    /// Encodes `payload` and writes it to the connection.
    pub async fn send(&self, payload: &[u8]) -> AppResult<()> {
        let wire = self.codec.encode(payload)?;
        if let Some(tap) = &self.tap {
            let index = self.tx_index.fetch_add(1, Ordering::Relaxed) + 1;
            tap.observe(Direction::Tx, &self.remote, index, payload).await;
        }
        self.connection.send(&wire).await
    }

    /// Reads, decodes and dispatches frames until `cancel` fires, the
    /// counterpart closes or resets the link, or a transport fault occurs.
    ///
    /// Frames are handed to `on_frame` strictly in arrival order, each
    /// awaited before the next. Disconnects end the loop with `Ok(())`;
    /// other transport errors are returned. The connection is closed on
    /// every exit path.
    pub async fn receive_loop<F, Fut>(&self, mut on_frame: F, cancel: CancellationToken) -> AppResult<()>
    where
        F: FnMut(Frame) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut buffer = self.buffer.try_lock().map_err(|_| {
            AppError::IllegalStateError(format!("receive loop for {} already running", self.remote))
        })?;
        {
            let mut state = self.state.lock();
            match *state {
                PeerState::Closed | PeerState::Faulted => {
                    return Err(AppError::UseAfterClose(format!("peer {}", self.remote)));
                }
                _ => *state = PeerState::Receiving,
            }
        }
        debug!("receive loop started for {}", self.remote);

        let result = self.run_receive(&mut buffer, &mut on_frame, &cancel).await;

        if let Err(e) = self.connection.close().await {
            warn!("closing connection to {} failed: {}", self.remote, e);
        }
        match &result {
            Ok(()) => {
                *self.state.lock() = PeerState::Closed;
                debug!("receive loop for {} ended", self.remote);
            }
            Err(e) => {
                *self.state.lock() = PeerState::Faulted;
                error!("receive loop for {} faulted: {}", self.remote, e);
            }
        }
        result
    }

    async fn run_receive<F, Fut>(
        &self,
        buffer: &mut BytesMut,
        on_frame: &mut F,
        cancel: &CancellationToken,
    ) -> AppResult<()>
    where
        F: FnMut(Frame) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut frame_index: u64 = 0;

        while !cancel.is_cancelled() {
            // read straight into the space after the undecoded tail
            let tail = buffer.len();
            buffer.resize(tail + self.read_buffer_size, 0);
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = self.connection.receive(&mut buffer[tail..]) => Some(res),
            };
            let read = match read {
                None => {
                    buffer.truncate(tail);
                    debug!("receive loop for {} cancelled", self.remote);
                    break;
                }
                Some(Ok(read)) => read,
                Some(Err(e)) if e.is_disconnect() => {
                    buffer.truncate(tail);
                    debug!("{} went away: {}", self.remote, e);
                    break;
                }
                Some(Err(e)) => {
                    buffer.truncate(tail);
                    return Err(e);
                }
            };
            buffer.truncate(tail + read);
            if read == 0 {
                debug!("{} closed the connection", self.remote);
                break;
            }

            let frames = drain_frames(self.codec.as_ref(), buffer);
            trace!(
                "read {} bytes from {}, decoded {} frames, {} bytes pending",
                read,
                self.remote,
                frames.len(),
                buffer.len()
            );

            for frame in frames {
                frame_index += 1;
                if let Some(tap) = &self.tap {
                    tap.observe(Direction::Rx, &self.remote, frame_index, &frame)
                        .await;
                }
                on_frame(frame).await;
            }
        }
        Ok(())
    }
}
