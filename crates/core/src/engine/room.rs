//! Room lifecycle: create, join, rejoin, check, close, reopen, delete,
//! and participant administration.

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Participant, ParticipantRole, Room, RoomStatus, Template};
use crate::permissions::RoomAction;

use super::{Caller, RoomEngine};

/// Parameters for room creation
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub template: Template,
    pub facilitator_name: String,
    pub password: Option<String>,
    pub max_postits_per_user: Option<u32>,
}

/// Pre-join probe result: enough to render a join screen, nothing more
#[derive(Debug, Clone)]
pub struct RoomCheck {
    pub id: Uuid,
    pub name: String,
    pub status: RoomStatus,
    pub requires_password: bool,
}

impl RoomEngine {
    /// Create a room with the caller as facilitator. Requires an
    /// authenticated caller; the durable record is written first so its ids
    /// survive fast-store loss, but its failure does not block the session.
    pub async fn create_room(&self, caller: Caller, req: NewRoom) -> Result<Room> {
        let Some(owner_id) = caller.user_id else {
            return Err(Error::Forbidden(
                "creating a room requires a signed-in user".into(),
            ));
        };
        if req.name.trim().is_empty() {
            return Err(Error::Conflict("room name must not be empty".into()));
        }
        let ids = match self.metadata() {
            Some(store) => match store.create_room_record(
                owner_id,
                &req.name,
                req.template,
                req.password.as_deref(),
                req.max_postits_per_user,
            ) {
                Ok(ids) => Some(ids),
                Err(e) => {
                    warn!(error = %e, "Durable room record failed; continuing with fresh ids");
                    None
                }
            },
            None => None,
        };
        let (room_id, facilitator_id) =
            ids.unwrap_or_else(|| (Uuid::new_v4(), Uuid::new_v4()));
        let facilitator = Participant::with_id(
            facilitator_id,
            req.facilitator_name,
            ParticipantRole::Facilitator,
            Some(owner_id),
        );
        let room = Room::new(
            room_id,
            req.name,
            req.template,
            facilitator,
            Some(owner_id),
            req.password.is_some(),
            req.max_postits_per_user,
        );
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        self.sessions().save(&room).await?;
        info!(room_id = %room.id, template = %req.template.as_str(), "Room created");
        Ok(room)
    }

    /// Join a room, recovering it from the durable record if the fast store
    /// lost it. A signed-in caller who already has a roster entry is
    /// reattached to it instead of getting a duplicate.
    pub async fn join_room(
        &self,
        caller: Caller,
        room_id: Uuid,
        name: String,
        password: Option<String>,
        as_observer: bool,
    ) -> Result<(Room, Participant)> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let Some(mut room) = self.load_or_restore(room_id).await? else {
            return Err(Error::NotFound(format!("room {room_id}")));
        };
        Self::require_active(&room)?;
        if room.has_password {
            // The password gate is the one durable check that must not be
            // skipped when the metadata store is unavailable
            let Some(store) = self.metadata() else {
                return Err(Error::Forbidden("room requires a password".into()));
            };
            if !store.verify_password(room_id, password.as_deref().unwrap_or(""))? {
                return Err(Error::Forbidden("invalid room password".into()));
            }
        }

        if let Some(user_id) = caller.user_id {
            if let Some(existing) = room.participant_by_user(user_id) {
                let existing_id = existing.id;
                if let Some(p) = room.participant_mut(existing_id) {
                    p.is_online = true;
                }
                let participant = room
                    .participant(existing_id)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(format!("participant {existing_id}")))?;
                self.sessions().save(&room).await?;
                if let Some(store) = self.metadata() {
                    if let Err(e) = store.set_participant_online(existing_id, true) {
                        warn!(room_id = %room_id, error = %e, "Roster online flag not persisted");
                    }
                }
                info!(room_id = %room_id, participant_id = %existing_id, "Participant rejoined by identity");
                return Ok((room, participant));
            }
        }

        let role = if as_observer {
            ParticipantRole::Observer
        } else {
            ParticipantRole::Participant
        };
        let mut participant = Participant::new(name, role, caller.user_id);
        if let Some(store) = self.metadata() {
            let guest_name = participant.is_guest.then(|| participant.name.clone());
            match store.add_participant(
                room_id,
                participant.id,
                caller.user_id,
                guest_name.as_deref(),
                role,
            ) {
                // The durable id wins so recovery can match this entry later
                Ok(durable_id) => participant.id = durable_id,
                Err(e) => {
                    warn!(room_id = %room_id, error = %e, "Roster entry not persisted");
                }
            }
        }
        room.participants.push(participant.clone());
        self.sessions().save(&room).await?;
        info!(room_id = %room_id, participant_id = %participant.id, role = %role.as_str(), "Participant joined");
        Ok((room, participant))
    }

    /// Reattach to an existing roster entry after a dropped connection
    pub async fn rejoin_room(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
    ) -> Result<(Room, Participant)> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let Some(mut room) = self.load_or_restore(room_id).await? else {
            return Err(Error::NotFound(format!("room {room_id}")));
        };
        let Some(p) = room.participant_mut(participant_id) else {
            return Err(Error::NotFound(format!("participant {participant_id}")));
        };
        p.is_online = true;
        let participant = p.clone();
        self.sessions().save(&room).await?;
        if let Some(store) = self.metadata() {
            if let Err(e) = store.set_participant_online(participant_id, true) {
                warn!(room_id = %room_id, error = %e, "Roster online flag not persisted");
            }
        }
        Ok((room, participant))
    }

    /// Existence probe before joining. Does not restore the room into the
    /// fast store; the durable record alone answers it.
    pub async fn check_room(&self, room_id: Uuid) -> Result<RoomCheck> {
        if let Some(room) = self.sessions().load(room_id).await? {
            return Ok(RoomCheck {
                id: room.id,
                name: room.name,
                status: room.status,
                requires_password: room.has_password,
            });
        }
        if let Some(store) = self.metadata() {
            if let Some(meta) = store.get_room_metadata(room_id)? {
                return Ok(RoomCheck {
                    id: meta.id,
                    name: meta.name,
                    status: meta.status,
                    requires_password: meta.password_hash.is_some(),
                });
            }
        }
        Err(Error::NotFound(format!("room {room_id}")))
    }

    /// Close a room, making it read-only
    pub async fn close_room(&self, room_id: Uuid, actor_id: Uuid) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::authorize(&room, actor_id, RoomAction::ManageRoom)?;
        if room.status != RoomStatus::Active {
            return Err(Error::Conflict(format!("room is {}", room.status.as_str())));
        }
        self.timers().abort(room_id).await;
        room.status = RoomStatus::Closed;
        room.closed_at = Some(chrono::Utc::now());
        if let Some(timer) = &mut room.timer {
            timer.is_running = false;
        }
        self.sessions().save(&room).await?;
        if let Some(store) = self.metadata() {
            if let Err(e) = store.update_status(room_id, RoomStatus::Closed) {
                warn!(room_id = %room_id, error = %e, "Room status not persisted");
            }
        }
        info!(room_id = %room_id, "Room closed");
        Ok(room)
    }

    /// Reopen a closed room. Only CLOSED rooms can come back.
    pub async fn reopen_room(&self, room_id: Uuid, actor_id: Uuid) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::authorize(&room, actor_id, RoomAction::ManageRoom)?;
        if room.status != RoomStatus::Closed {
            return Err(Error::Conflict(format!("room is {}", room.status.as_str())));
        }
        room.status = RoomStatus::Active;
        room.closed_at = None;
        self.sessions().save(&room).await?;
        if let Some(store) = self.metadata() {
            if let Err(e) = store.update_status(room_id, RoomStatus::Active) {
                warn!(room_id = %room_id, error = %e, "Room status not persisted");
            }
        }
        info!(room_id = %room_id, "Room reopened");
        Ok(room)
    }

    /// Delete a room everywhere. Returns the connection ids that were routed
    /// to it so the transport layer can notify them before dropping routes.
    ///
    /// Unlike the other handlers the durable delete is a hard precondition:
    /// if the record cannot be removed the command fails and the session
    /// stays intact, so a recovered room can never resurrect a deleted one.
    pub async fn delete_room(&self, room_id: Uuid, actor_id: Uuid) -> Result<Vec<Uuid>> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let room = self.load_required(room_id).await?;
        Self::authorize(&room, actor_id, RoomAction::ManageRoom)?;
        if let Some(store) = self.metadata() {
            store.delete_room_record(room_id)?;
        }
        self.timers().abort(room_id).await;
        let connected = self.connections().connections_in_room(room_id).await;
        self.sessions().delete(room_id).await;
        info!(room_id = %room_id, "Room deleted");
        Ok(connected)
    }

    /// Change a participant's role. Facilitation transfers atomically when
    /// the new role is FACILITATOR; the actor cannot change their own role.
    pub async fn set_participant_role(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        target_id: Uuid,
        role: ParticipantRole,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ChangeRoles)?;
        if target_id == actor_id {
            return Err(Error::Forbidden("cannot change your own role".into()));
        }
        if room.participant(target_id).is_none() {
            return Err(Error::NotFound(format!("participant {target_id}")));
        }
        let mut demoted = None;
        if role == ParticipantRole::Facilitator {
            let previous = room.facilitator_id;
            if let Some(p) = room.participant_mut(previous) {
                p.role = ParticipantRole::Participant;
                demoted = Some(previous);
            }
            room.facilitator_id = target_id;
        }
        if let Some(p) = room.participant_mut(target_id) {
            p.role = role;
        }
        self.sessions().save(&room).await?;
        if let Some(store) = self.metadata() {
            if let Err(e) = store.set_participant_role(target_id, role) {
                warn!(room_id = %room_id, error = %e, "Roster role not persisted");
            }
            if let Some(previous) = demoted {
                if let Err(e) =
                    store.set_participant_role(previous, ParticipantRole::Participant)
                {
                    warn!(room_id = %room_id, error = %e, "Roster role not persisted");
                }
            }
        }
        info!(room_id = %room_id, participant_id = %target_id, role = %role.as_str(), "Role changed");
        Ok(room)
    }

    /// Presence flip, driven by the transport layer on connect/disconnect
    pub async fn set_participant_online(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        is_online: bool,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        let Some(p) = room.participant_mut(participant_id) else {
            return Err(Error::NotFound(format!("participant {participant_id}")));
        };
        p.is_online = is_online;
        self.sessions().save(&room).await?;
        if let Some(store) = self.metadata() {
            if let Err(e) = store.set_participant_online(participant_id, is_online) {
                warn!(room_id = %room_id, error = %e, "Roster online flag not persisted");
            }
        }
        Ok(room)
    }
}
