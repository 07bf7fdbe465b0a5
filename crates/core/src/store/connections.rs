//! Connection routing table
//!
//! Maps a physical connection to the participant it currently represents.
//! Process-scoped only: reconnecting re-registers, so nothing here needs to
//! survive a restart. The disconnect path consults this table to learn which
//! participant just went offline.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Where a connection currently points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRoute {
    pub room_id: Uuid,
    pub participant_id: Uuid,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    routes: RwLock<HashMap<Uuid, ConnectionRoute>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection_id: Uuid, room_id: Uuid, participant_id: Uuid) {
        self.routes
            .write()
            .await
            .insert(connection_id, ConnectionRoute { room_id, participant_id });
    }

    /// Remove a connection's route, returning it if one existed
    pub async fn unregister(&self, connection_id: Uuid) -> Option<ConnectionRoute> {
        self.routes.write().await.remove(&connection_id)
    }

    pub async fn route(&self, connection_id: Uuid) -> Option<ConnectionRoute> {
        self.routes.read().await.get(&connection_id).copied()
    }

    /// All connections currently routed into a room
    pub async fn connections_in_room(&self, room_id: Uuid) -> Vec<Uuid> {
        self.routes
            .read()
            .await
            .iter()
            .filter(|(_, r)| r.room_id == room_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop every route into a room (room deletion)
    pub async fn clear_room(&self, room_id: Uuid) {
        self.routes.write().await.retain(|_, r| r.room_id != room_id);
    }
}
