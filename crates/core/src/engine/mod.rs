//! Command engine
//!
//! One handler per mutating operation. Every handler follows the same shape:
//! take the room's write lock, load the aggregate (recovering from durable
//! metadata where the operation supports it), validate the caller against
//! role and phase, apply the mutation, persist the whole aggregate, and
//! return what the transport layer needs to broadcast.
//!
//! A failed command leaves the aggregate exactly as it was: validation
//! happens before any mutation, and the per-room lock keeps concurrent
//! commands from interleaving their load-modify-save cycles.

mod actions;
mod group;
mod phase;
mod postit;
mod room;
mod timer;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Participant, Room, RoomStatus, RoomSummary};
use crate::permissions::{PermissionMatrix, RoomAction};
use crate::recovery;
use crate::store::{ConnectionRegistry, MetadataStore, SessionStore};
use crate::timer::TimerRegistry;

pub use actions::ActionItemPatch;
pub use room::{NewRoom, RoomCheck};

/// Identity as resolved by the transport layer. The engine never sees
/// credentials, only "authenticated as this user" or "guest".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Uuid>,
}

impl Caller {
    pub fn authenticated(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id) }
    }

    pub fn guest() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Broadcast-worthy facts that originate outside an inbound command
/// (currently only timer ticks)
#[derive(Debug, Clone)]
pub enum EngineEvent {
    RoomUpdated(Room),
}

/// The session engine. Shared across all connections; cheap to clone via Arc.
pub struct RoomEngine {
    sessions: SessionStore,
    metadata: Option<Arc<MetadataStore>>,
    timers: TimerRegistry,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl RoomEngine {
    /// Build an engine. The returned receiver carries background-originated
    /// events the transport layer must broadcast.
    pub fn new(
        metadata: Option<Arc<MetadataStore>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            sessions: SessionStore::new(),
            metadata,
            timers: TimerRegistry::new(),
            events_tx,
        });
        (engine, events_rx)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        self.sessions.connections()
    }

    /// Rooms a user owns or has participated in, from the durable record
    pub fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<RoomSummary>> {
        match &self.metadata {
            Some(store) => store.rooms_for_user(user_id),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) async fn load_required(&self, room_id: Uuid) -> Result<Room> {
        self.sessions
            .load(room_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))
    }

    /// Fast-store load, falling back to the recovery bridge when the durable
    /// record still exists. The restored room is persisted immediately so
    /// subsequent commands skip the bridge.
    pub(crate) async fn load_or_restore(&self, room_id: Uuid) -> Result<Option<Room>> {
        if let Some(room) = self.sessions.load(room_id).await? {
            return Ok(Some(room));
        }
        let Some(store) = &self.metadata else {
            return Ok(None);
        };
        match store.get_room_metadata(room_id) {
            Ok(Some(metadata)) => {
                let mut room = recovery::restore_from_metadata(&metadata);
                room.normalize();
                self.sessions.save(&room).await?;
                Ok(Some(room))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Metadata lookup failed during recovery");
                Ok(None)
            }
        }
    }

    pub(crate) fn metadata(&self) -> Option<&Arc<MetadataStore>> {
        self.metadata.as_ref()
    }

    pub(crate) fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // Receiver gone just means nobody is broadcasting anymore
        let _ = self.events_tx.send(event);
    }

    pub(crate) fn require_participant(room: &Room, id: Uuid) -> Result<&Participant> {
        room.participant(id)
            .ok_or_else(|| Error::NotFound(format!("participant {id}")))
    }

    /// Role check against the capability matrix
    pub(crate) fn authorize(room: &Room, actor_id: Uuid, action: RoomAction) -> Result<()> {
        let actor = Self::require_participant(room, actor_id)?;
        if PermissionMatrix::can_perform(actor.role, action) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "role {} may not perform this action",
                actor.role.as_str()
            )))
        }
    }

    /// Closed and archived rooms are read-only (reopen and delete excepted)
    pub(crate) fn require_active(room: &Room) -> Result<()> {
        if room.status == RoomStatus::Active {
            Ok(())
        } else {
            Err(Error::Conflict(format!(
                "room is {}",
                room.status.as_str()
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::models::{ParticipantRole, Template};

    /// Engine backed by an in-memory metadata store
    pub(crate) fn engine() -> (Arc<RoomEngine>, mpsc::UnboundedReceiver<EngineEvent>) {
        let metadata = MetadataStore::open_in_memory().expect("in-memory db");
        RoomEngine::new(Some(Arc::new(metadata)))
    }

    /// Engine plus a created room; returns (engine, room, facilitator_id, owner)
    pub(crate) async fn engine_with_room() -> (Arc<RoomEngine>, Room, Uuid, Caller) {
        let (engine, _rx) = engine();
        let owner = Caller::authenticated(Uuid::new_v4());
        let room = engine
            .create_room(
                owner,
                NewRoom {
                    name: "sprint 12".into(),
                    template: Template::Classic,
                    facilitator_name: "alice".into(),
                    password: None,
                    max_postits_per_user: None,
                },
            )
            .await
            .expect("room created");
        let facilitator_id = room.facilitator_id;
        (engine, room, facilitator_id, owner)
    }

    /// Add a plain participant to a room, returning its id
    pub(crate) async fn add_participant(
        engine: &Arc<RoomEngine>,
        room_id: Uuid,
        name: &str,
    ) -> Uuid {
        let (_, participant) = engine
            .join_room(Caller::guest(), room_id, name.to_string(), None, false)
            .await
            .expect("joined");
        participant.id
    }

    /// Add an observer to a room, returning its id
    pub(crate) async fn add_observer(
        engine: &Arc<RoomEngine>,
        room_id: Uuid,
        name: &str,
    ) -> Uuid {
        let (_, participant) = engine
            .join_room(Caller::guest(), room_id, name.to_string(), None, true)
            .await
            .expect("joined");
        assert_eq!(participant.role, ParticipantRole::Observer);
        participant.id
    }
}
