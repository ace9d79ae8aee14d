use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A connected WebSocket client.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    /// Sequence of the last event delivered to this client.
    pub last_sequence: u64,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Tracks active WebSocket connections.
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add(&self, conn: Connection) {
        let id = conn.id;
        self.connections.write().await.insert(id, conn);
        tracing::info!(connection_id = %id, "Connection added");
    }

    pub async fn remove(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
        tracing::info!(connection_id = %id, "Connection removed");
    }

    /// Sends a message to one client. Returns `false` if it is gone.
    pub async fn send_to(&self, id: Uuid, message: &str) -> bool {
        self.connections
            .read()
            .await
            .get(&id)
            .is_some_and(|conn| conn.tx.send(message.to_string()).is_ok())
    }

    /// Sends an event to one client unless it has already seen `sequence`.
    pub async fn deliver(&self, id: Uuid, sequence: u64, message: &str) -> bool {
        let mut conns = self.connections.write().await;
        let Some(conn) = conns.get_mut(&id) else {
            return false;
        };
        if sequence <= conn.last_sequence {
            return true;
        }
        conn.last_sequence = sequence;
        conn.tx.send(message.to_string()).is_ok()
    }

    pub async fn last_sequence(&self, id: Uuid) -> Option<u64> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|conn| conn.last_sequence)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }
}
