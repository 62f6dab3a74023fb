use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Direction, DumpOptions, DUMP_TARGET};
use crate::network::{Connection, EndpointDescriptor};
use crate::AppResult;

/// Connection decorator that dumps every raw chunk in both directions.
///
/// Unlike a frame tap this shows bytes exactly as the transport delivered
/// them, before any framing.
pub struct WireTapConnection {
    inner: Arc<dyn Connection>,
    options: DumpOptions,
    remote: String,
}

impl WireTapConnection {
    pub fn new(inner: Arc<dyn Connection>, options: DumpOptions) -> WireTapConnection {
        let remote = inner.remote_identity().to_string();
        WireTapConnection {
            inner,
            options,
            remote,
        }
    }

    fn dump(&self, direction: Direction, data: &[u8]) {
        let label = format!("bytes={}", data.len());
        if let Some(text) = self.options.render(direction, &self.remote, &label, data) {
            info!(target: DUMP_TARGET, "{}", text);
        }
    }
}

#[async_trait]
impl Connection for WireTapConnection {
    fn remote_identity(&self) -> &EndpointDescriptor {
        self.inner.remote_identity()
    }

    async fn send(&self, data: &[u8]) -> AppResult<()> {
        self.dump(Direction::Tx, data);
        self.inner.send(data).await
    }

    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize> {
        let read = self.inner.receive(buf).await?;
        if read > 0 {
            self.dump(Direction::Rx, &buf[..read]);
        }
        Ok(read)
    }

    async fn close(&self) -> AppResult<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
