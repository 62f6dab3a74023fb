use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::network::Connection;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Registry of live connections so they can be closed together.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<u64, Arc<dyn Connection>>,
}

impl ConnectionManager {
    pub fn new() -> ConnectionManager {
        ConnectionManager::default()
    }

    /// Registers `connection` and returns its id.
    pub fn add(&self, connection: Arc<dyn Connection>) -> u64 {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(id, connection);
        id
    }

    pub fn remove(&self, id: u64) -> Option<Arc<dyn Connection>> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    pub fn get(&self, id: u64) -> Option<Arc<dyn Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Closes every registered connection and empties the registry.
    pub async fn close_all(&self) {
        // collect first: no map guard may live across an await
        let ids: Vec<u64> = self.connections.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, connection)) = self.connections.remove(&id) {
                if let Err(e) = connection.close().await {
                    warn!(
                        "closing connection {} to {} failed: {}",
                        id,
                        connection.remote_identity(),
                        e
                    );
                }
            }
        }
        debug!("all registered connections closed");
    }
}
