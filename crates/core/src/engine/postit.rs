//! Sticky-note commands: creation with quota, phase-gated edits, moves,
//! grouping, per-note votes, and the shared focus pointer.

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Room, StickyNote};
use crate::permissions::{PermissionMatrix, RoomAction};

use super::RoomEngine;

impl RoomEngine {
    fn check_note_quota(room: &Room, author_id: Uuid) -> Result<()> {
        Self::authorize(room, author_id, RoomAction::CreateNote)?;
        if let Some(max) = room.max_postits_per_user {
            let written = room
                .postits
                .iter()
                .filter(|n| n.author_id == author_id)
                .count();
            if written >= max as usize {
                return Err(Error::LimitReached(format!(
                    "limit of {max} post-its per participant reached"
                )));
            }
        }
        Ok(())
    }

    fn require_column(room: &Room, column_id: &str) -> Result<()> {
        if room.columns.iter().any(|c| c.id == column_id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("column {column_id}")))
        }
    }

    /// Non-mutating probe the UI uses to enable or disable its composer
    pub async fn can_create_postit(&self, room_id: Uuid, author_id: Uuid) -> Result<()> {
        let room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::check_note_quota(&room, author_id)
    }

    /// Create a note. The author name is denormalized from the roster at
    /// creation time and never updated afterwards.
    pub async fn create_postit(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        content: String,
        column_id: String,
        color: String,
    ) -> Result<StickyNote> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::check_note_quota(&room, author_id)?;
        Self::require_column(&room, &column_id)?;
        let author_name = Self::require_participant(&room, author_id)?.name.clone();
        let note = StickyNote::new(content, author_id, author_name, column_id, color);
        room.postits.push(note.clone());
        self.sessions().save(&room).await?;
        debug!(room_id = %room_id, postit_id = %note.id, "Post-it created");
        Ok(note)
    }

    /// Edit note content. What is editable depends on the phase: authors in
    /// the writing phases, author or facilitator during discussion, nobody
    /// afterwards.
    pub async fn update_postit(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        postit_id: Uuid,
        content: String,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        let actor_role = Self::require_participant(&room, actor_id)?.role;
        let Some(note) = room.postit(postit_id) else {
            return Err(Error::NotFound(format!("post-it {postit_id}")));
        };
        let is_author = note.author_id == actor_id;
        if !PermissionMatrix::can_edit_note(room.phase, is_author, actor_role) {
            return Err(Error::Forbidden(
                "post-it content is locked in this phase".into(),
            ));
        }
        if let Some(note) = room.postit_mut(postit_id) {
            note.content = content;
        }
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Move a note to another column
    pub async fn move_postit(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        postit_id: Uuid,
        column_id: String,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::MoveNote)?;
        Self::require_column(&room, &column_id)?;
        let Some(note) = room.postit_mut(postit_id) else {
            return Err(Error::NotFound(format!("post-it {postit_id}")));
        };
        note.column_id = column_id;
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Attach a note to a group, or detach it with `None`
    pub async fn assign_postit_to_group(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        postit_id: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::GroupNote)?;
        if let Some(gid) = group_id {
            if room.group(gid).is_none() {
                return Err(Error::NotFound(format!("group {gid}")));
            }
        }
        let Some(note) = room.postit_mut(postit_id) else {
            return Err(Error::NotFound(format!("post-it {postit_id}")));
        };
        note.group_id = group_id;
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Toggle the actor's vote on a note. Casting while present retracts.
    pub async fn toggle_postit_vote(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        postit_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::Vote)?;
        let Some(note) = room.postit_mut(postit_id) else {
            return Err(Error::NotFound(format!("post-it {postit_id}")));
        };
        note.toggle_vote(actor_id);
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Point everyone's view at one note, or clear the pointer
    pub async fn focus_postit(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        postit_id: Option<Uuid>,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::require_participant(&room, actor_id)?;
        if let Some(id) = postit_id {
            if room.postit(id).is_none() {
                return Err(Error::NotFound(format!("post-it {id}")));
            }
        }
        room.focused_postit_id = postit_id;
        self.sessions().save(&room).await?;
        Ok(room)
    }
}
