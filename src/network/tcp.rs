use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::network::{Connection, EndpointDescriptor, Listener, StreamConnection};
use crate::{AppError, AppResult};

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    inner: StreamConnection<OwnedReadHalf, OwnedWriteHalf>,
}

impl TcpConnection {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> AppResult<TcpConnection> {
        let stream = TcpStream::connect(addr).await?;
        TcpConnection::from_stream(stream)
    }

    /// Connects, giving up once `timeout` elapses.
    pub async fn connect_timeout(addr: SocketAddr, timeout: Duration) -> AppResult<TcpConnection> {
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(stream) => TcpConnection::from_stream(stream?),
            Err(_) => Err(AppError::DetailedIoError(format!(
                "connect to {} timed out after {:?}",
                addr, timeout
            ))),
        }
    }

    pub fn from_stream(stream: TcpStream) -> AppResult<TcpConnection> {
        let remote = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        debug!("tcp connection established with {}", remote);
        Ok(TcpConnection {
            inner: StreamConnection::new(reader, writer, remote.into()),
        })
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn remote_identity(&self) -> &EndpointDescriptor {
        self.inner.remote_identity()
    }

    async fn send(&self, data: &[u8]) -> AppResult<()> {
        self.inner.send(data).await
    }

    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize> {
        self.inner.receive(buf).await
    }

    async fn close(&self) -> AppResult<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Accepts inbound TCP connections.
#[derive(Debug)]
pub struct TcpListener {
    endpoint: SocketAddr,
    inner: Option<tokio::net::TcpListener>,
    closed: bool,
}

impl TcpListener {
    pub fn new(endpoint: SocketAddr) -> TcpListener {
        TcpListener {
            endpoint,
            inner: None,
            closed: false,
        }
    }

    /// The bound address; differs from the configured one when binding port 0.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener()?.local_addr()?)
    }

    fn listener(&self) -> AppResult<&tokio::net::TcpListener> {
        if self.closed {
            return Err(AppError::UseAfterClose(format!(
                "tcp listener on {}",
                self.endpoint
            )));
        }
        self.inner.as_ref().ok_or_else(|| {
            AppError::IllegalStateError(format!("tcp listener on {} not started", self.endpoint))
        })
    }

    async fn accept_stream(&self) -> AppResult<TcpStream> {
        let listener = self.listener()?;
        let mut backoff = 1;

        loop {
            match listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::Accept(format!(
                            "accept tcp connection error: {}",
                            err
                        )));
                    }
                    warn!("accept failed on {}, retrying in {}s: {}", self.endpoint, backoff, err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl Listener for TcpListener {
    async fn start(&mut self) -> AppResult<()> {
        if self.closed {
            return Err(AppError::UseAfterClose(format!(
                "tcp listener on {}",
                self.endpoint
            )));
        }
        if self.inner.is_some() {
            return Err(AppError::IllegalStateError(format!(
                "tcp listener on {} already started",
                self.endpoint
            )));
        }
        let listener = tokio::net::TcpListener::bind(self.endpoint)
            .await
            .map_err(|err| {
                AppError::DetailedIoError(format!(
                    "Failed to bind listener to address: {} - Error: {}",
                    self.endpoint, err
                ))
            })?;
        info!("tcp listener binding to {} for listening", listener.local_addr()?);
        self.inner = Some(listener);
        Ok(())
    }

    async fn accept(&self) -> AppResult<Arc<dyn Connection>> {
        let socket = self.accept_stream().await?;
        Ok(Arc::new(TcpConnection::from_stream(socket)?))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.take();
            debug!("tcp listener on {} closed", self.endpoint);
        }
    }
}
