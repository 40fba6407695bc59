//! services/api/src/notify/presence.rs
//!
//! Tracks which users currently hold live WebSocket connections, and the
//! sending half of each connection's event channel.
//!
//! The registry is process-local and rebuilt from nothing as clients
//! reconnect after a restart; it is never persisted.

use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::web::protocol::ServerEvent;

/// Identifies one WebSocket connection. A user with several tabs open
/// holds several of these under the same user id.
pub type ConnectionId = Uuid;

#[derive(Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<Uuid, HashMap<ConnectionId, UnboundedSender<ServerEvent>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a connection with a user. Registering the same connection
    /// id again just replaces its sender.
    pub async fn register(
        &self,
        user_id: Uuid,
        connection_id: ConnectionId,
        sender: UnboundedSender<ServerEvent>,
    ) {
        let mut connections = self.connections.write().await;
        connections
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);
    }

    /// Drops a connection. The user's entry disappears with its last
    /// connection; the map never accumulates empty sets.
    pub async fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(handles) = connections.get_mut(&user_id) {
            handles.remove(&connection_id);
            if handles.is_empty() {
                connections.remove(&user_id);
            }
        }
    }

    /// Snapshot of the user's live connections; empty when they are offline.
    pub async fn connections_for(
        &self,
        user_id: Uuid,
    ) -> Vec<(ConnectionId, UnboundedSender<ServerEvent>)> {
        let connections = self.connections.read().await;
        connections
            .get(&user_id)
            .map(|handles| {
                handles
                    .iter()
                    .map(|(id, sender)| (*id, sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of distinct users with at least one live connection.
    pub async fn online_user_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
