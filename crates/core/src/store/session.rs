//! Fast session store
//!
//! Holds the live Room aggregates for the duration of a session, keyed by
//! room id. Snapshots are stored serialized so the load path exercises the
//! same repair rules a process restart would: deserialize, default missing
//! fields, then `Room::normalize`.
//!
//! Every mutation replaces the whole snapshot; there is no field-level
//! update path. Mutating handlers therefore hold the per-room lock from
//! `room_lock` across their load-modify-save to keep concurrent commands
//! from clobbering each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Room;

use super::connections::ConnectionRegistry;

#[derive(Default)]
pub struct SessionStore {
    /// Room id -> JSON snapshot
    rooms: RwLock<HashMap<Uuid, String>>,
    /// Per-room write locks; entries are created lazily and live as long as
    /// the room does
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    connections: ConnectionRegistry,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a room, applying the repair-on-read rules
    pub async fn load(&self, room_id: Uuid) -> Result<Option<Room>> {
        let snapshot = {
            let rooms = self.rooms.read().await;
            rooms.get(&room_id).cloned()
        };
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        let mut room: Room = serde_json::from_str(&snapshot)?;
        room.normalize();
        Ok(Some(room))
    }

    /// Serialize and store the full aggregate, replacing any prior snapshot
    pub async fn save(&self, room: &Room) -> Result<()> {
        crate::invariants::assert_room_invariants(room);
        let snapshot = serde_json::to_string(room)?;
        self.rooms.write().await.insert(room.id, snapshot);
        Ok(())
    }

    /// Remove the snapshot and every connection route pointing at it
    pub async fn delete(&self, room_id: Uuid) -> bool {
        let removed = self.rooms.write().await.remove(&room_id).is_some();
        if removed {
            self.connections.clear_room(room_id).await;
            self.locks.lock().await.remove(&room_id);
            debug!(room_id = %room_id, "Room snapshot deleted");
        }
        removed
    }

    pub async fn contains(&self, room_id: Uuid) -> bool {
        self.rooms.read().await.contains_key(&room_id)
    }

    /// Administrative enumeration of known room ids
    pub async fn room_ids(&self) -> Vec<Uuid> {
        self.rooms.read().await.keys().copied().collect()
    }

    /// Per-room mutex serializing mutating commands against this room
    pub async fn room_lock(&self, room_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(room_id).or_default().clone()
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Participant, ParticipantRole, Template};

    fn sample_room() -> Room {
        let facilitator = Participant::new("alice".into(), ParticipantRole::Facilitator, None);
        Room::new(
            Uuid::new_v4(),
            "sprint 12".into(),
            Template::Classic,
            facilitator,
            None,
            false,
            None,
        )
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = SessionStore::new();
        let room = sample_room();
        store.save(&room).await.unwrap();

        let loaded = store.load(room.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, room.id);
        assert_eq!(loaded.name, room.name);
        assert_eq!(loaded.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_load_absent_room() {
        let store = SessionStore::new();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_clears_routes() {
        let store = SessionStore::new();
        let room = sample_room();
        store.save(&room).await.unwrap();
        let conn = Uuid::new_v4();
        store.connections().register(conn, room.id, Uuid::new_v4()).await;

        assert!(store.delete(room.id).await);
        assert!(store.load(room.id).await.unwrap().is_none());
        assert!(store.connections().route(conn).await.is_none());
        assert!(!store.delete(room.id).await);
    }

    #[tokio::test]
    async fn test_repair_on_read_of_old_snapshot() {
        // A structurally older snapshot: groups without status, participants
        // without role, no focus fields, no room status
        let store = SessionStore::new();
        let room = sample_room();
        let facilitator_id = room.facilitator_id;
        let raw = format!(
            r##"{{
                "id": "{id}",
                "name": "old",
                "template": "CLASSIC",
                "columns": [],
                "groups": [{{"id":"{gid}","title":"t","color":"#eee"}}],
                "phase": "VOTING",
                "facilitator_id": "{fid}",
                "max_postits_per_user": null,
                "owner_id": null,
                "timer": null,
                "participants": [{{"id":"{fid}","name":"alice","user_id":null}}],
                "created_at": "2024-01-01T00:00:00Z",
                "closed_at": null
            }}"##,
            id = room.id,
            gid = Uuid::new_v4(),
            fid = facilitator_id,
        );
        store.rooms.write().await.insert(room.id, raw);

        let loaded = store.load(room.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, crate::models::RoomStatus::Active);
        assert_eq!(loaded.groups[0].status, crate::models::GroupStatus::Pending);
        assert_eq!(
            loaded.participant(facilitator_id).unwrap().role,
            ParticipantRole::Facilitator
        );
        assert_eq!(loaded.focused_group_id, None);
    }

    #[tokio::test]
    async fn test_room_lock_is_shared_per_room() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        let a = store.room_lock(id).await;
        let b = store.room_lock(id).await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
