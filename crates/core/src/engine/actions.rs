//! Action items. Deliberately not phase-gated: follow-ups get captured the
//! moment they come up, whatever the board is doing.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ActionItem, ActionStatus, Room};
use crate::permissions::RoomAction;

use super::RoomEngine;

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ActionItemPatch {
    pub content: Option<String>,
    pub owner_name: Option<String>,
    pub group_id: Option<Uuid>,
    pub status: Option<ActionStatus>,
}

impl RoomEngine {
    pub async fn create_action_item(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        content: String,
        owner_name: Option<String>,
        group_id: Option<Uuid>,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::CreateNote)?;
        if let Some(gid) = group_id {
            if room.group(gid).is_none() {
                return Err(Error::NotFound(format!("group {gid}")));
            }
        }
        room.action_items
            .push(ActionItem::new(content, owner_name, group_id));
        self.sessions().save(&room).await?;
        Ok(room)
    }

    pub async fn update_action_item(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        action_id: Uuid,
        patch: ActionItemPatch,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::CreateNote)?;
        if let Some(gid) = patch.group_id {
            if room.group(gid).is_none() {
                return Err(Error::NotFound(format!("group {gid}")));
            }
        }
        let Some(item) = room.action_items.iter_mut().find(|a| a.id == action_id) else {
            return Err(Error::NotFound(format!("action item {action_id}")));
        };
        if let Some(content) = patch.content {
            item.content = content;
        }
        if let Some(owner_name) = patch.owner_name {
            item.owner_name = Some(owner_name);
        }
        if let Some(gid) = patch.group_id {
            item.group_id = Some(gid);
        }
        if let Some(status) = patch.status {
            item.status = status;
        }
        self.sessions().save(&room).await?;
        Ok(room)
    }

    pub async fn delete_action_item(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        action_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::CreateNote)?;
        if !room.action_items.iter().any(|a| a.id == action_id) {
            return Err(Error::NotFound(format!("action item {action_id}")));
        }
        room.action_items.retain(|a| a.id != action_id);
        self.sessions().save(&room).await?;
        Ok(room)
    }
}
