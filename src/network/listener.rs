use std::sync::Arc;

use async_trait::async_trait;

use crate::network::Connection;
use crate::AppResult;

/// Source of inbound connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Binds and begins listening.
    async fn start(&mut self) -> AppResult<()>;

    /// Suspends until a connection arrives. Fails before `start` and after
    /// `close`.
    async fn accept(&self) -> AppResult<Arc<dyn Connection>>;

    /// Stops listening and releases the socket. Idempotent.
    async fn close(&mut self);
}
