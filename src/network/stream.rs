use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::network::{Connection, EndpointDescriptor};
use crate::{AppError, AppResult};

/// A connection over any pair of async read/write halves.
///
/// The two halves sit behind independent locks so a pending read never
/// holds up a write. Each half is an `Option` that `close` takes, which is
/// what guarantees the handle is released once.
#[derive(Debug)]
pub struct StreamConnection<R, W> {
    remote: EndpointDescriptor,
    reader: Mutex<Option<R>>,
    writer: Mutex<Option<BufWriter<W>>>,
    closed: CancellationToken,
}

/// Result of an I/O call interrupted by a local `close`.
pub(crate) fn aborted_locally() -> AppError {
    AppError::OperationAborted
}

impl<R, W> StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, remote: EndpointDescriptor) -> Self {
        StreamConnection {
            remote,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(BufWriter::new(writer))),
            closed: CancellationToken::new(),
        }
    }

    fn use_after_close(&self) -> AppError {
        AppError::UseAfterClose(format!("connection to {}", self.remote))
    }
}

#[async_trait]
impl<R, W> Connection for StreamConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn remote_identity(&self) -> &EndpointDescriptor {
        &self.remote
    }

    async fn send(&self, data: &[u8]) -> AppResult<()> {
        if self.closed.is_cancelled() {
            return Err(self.use_after_close());
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| self.use_after_close())?;

        tokio::select! {
            _ = self.closed.cancelled() => Err(aborted_locally()),
            res = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => {
                res?;
                trace!("sent {} bytes to {}", data.len(), self.remote);
                Ok(())
            }
        }
    }

    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize> {
        if self.closed.is_cancelled() {
            return Err(self.use_after_close());
        }
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| self.use_after_close())?;

        tokio::select! {
            _ = self.closed.cancelled() => Err(aborted_locally()),
            res = reader.read(buf) => Ok(res?),
        }
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        // wakes any in-flight read or write so their locks are released
        self.closed.cancel();

        if let Some(mut writer) = self.writer.lock().await.take() {
            // half-close first; the peer may already be gone, which is fine
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown of {} failed: {}", self.remote, e);
            }
        }
        self.reader.lock().await.take();
        debug!("connection to {} closed", self.remote);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
