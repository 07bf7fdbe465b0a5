//! Group commands: facilitator-managed group lifecycle, budgeted group
//! voting with tie handling, and the discussion rotation.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Group, GroupStatus, Room, VOTE_BUDGET};
use crate::permissions::RoomAction;

use super::RoomEngine;

const DEFAULT_GROUP_COLOR: &str = "#e0e0e0";

impl RoomEngine {
    /// Promote one group to ACTIVE, demoting whichever group held it
    fn activate(room: &mut Room, group_id: Uuid) {
        for group in &mut room.groups {
            if group.id == group_id {
                group.status = GroupStatus::Active;
            } else if group.status == GroupStatus::Active {
                group.status = GroupStatus::Pending;
            }
        }
        room.focused_group_id = Some(group_id);
    }

    /// Focus the highest-voted PENDING group, first wins on a tie. No
    /// pending groups clears the focus instead.
    pub(crate) fn focus_top_voted(room: &mut Room) {
        match room.top_pending_group().map(|g| g.id) {
            Some(top_id) => Self::activate(room, top_id),
            None => room.focused_group_id = None,
        }
    }

    pub async fn create_group(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        title: String,
        color: Option<String>,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ManageGroups)?;
        let group = Group::new(title, color.unwrap_or_else(|| DEFAULT_GROUP_COLOR.into()));
        debug!(room_id = %room_id, group_id = %group.id, "Group created");
        room.groups.push(group);
        self.sessions().save(&room).await?;
        Ok(room)
    }

    pub async fn rename_group(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        group_id: Uuid,
        title: String,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ManageGroups)?;
        let Some(group) = room.group_mut(group_id) else {
            return Err(Error::NotFound(format!("group {group_id}")));
        };
        group.title = title;
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Delete a group, detaching its notes rather than deleting them
    pub async fn delete_group(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        group_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ManageGroups)?;
        if room.group(group_id).is_none() {
            return Err(Error::NotFound(format!("group {group_id}")));
        }
        room.groups.retain(|g| g.id != group_id);
        for note in &mut room.postits {
            if note.group_id == Some(group_id) {
                note.group_id = None;
            }
        }
        if room.focused_group_id == Some(group_id) {
            room.focused_group_id = None;
        }
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Spend one vote on a group, bounded by the per-participant budget
    /// across all groups
    pub async fn cast_group_vote(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        group_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::Vote)?;
        if room.group_votes_spent(actor_id) >= VOTE_BUDGET {
            return Err(Error::LimitReached(format!(
                "vote budget of {VOTE_BUDGET} spent"
            )));
        }
        let Some(group) = room.group_mut(group_id) else {
            return Err(Error::NotFound(format!("group {group_id}")));
        };
        group.votes.push(actor_id);
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Give one vote back. Retracting with none cast is a conflict.
    pub async fn retract_group_vote(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        group_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::Vote)?;
        let Some(group) = room.group_mut(group_id) else {
            return Err(Error::NotFound(format!("group {group_id}")));
        };
        if !group.retract_vote(actor_id) {
            return Err(Error::Conflict("no vote to retract on this group".into()));
        }
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Break a tie by clearing only the votes of the groups tied at the
    /// maximum; everything below the leaders keeps its votes
    pub async fn reset_tie_votes(&self, room_id: Uuid, actor_id: Uuid) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ManageGroups)?;
        let standings = room.vote_standings();
        if !standings.has_tie() {
            return Err(Error::Conflict("no tie at the top to reset".into()));
        }
        for group in &mut room.groups {
            if standings.tied_groups.contains(&group.id) {
                group.votes.clear();
            }
        }
        info!(room_id = %room_id, tied = standings.tied_groups.len(), "Tie votes reset");
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Point the discussion at one group
    pub async fn focus_group(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        group_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::FocusGroup)?;
        if room.group(group_id).is_none() {
            return Err(Error::NotFound(format!("group {group_id}")));
        }
        Self::activate(&mut room, group_id);
        self.sessions().save(&room).await?;
        Ok(room)
    }

    /// Mark a group DONE and rotate focus to the next highest-voted
    /// PENDING group; the rotation ends with no focus when none remain
    pub async fn complete_group_and_focus_next(
        &self,
        room_id: Uuid,
        actor_id: Uuid,
        group_id: Uuid,
    ) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::FocusGroup)?;
        let Some(group) = room.group_mut(group_id) else {
            return Err(Error::NotFound(format!("group {group_id}")));
        };
        group.status = GroupStatus::Done;
        Self::focus_top_voted(&mut room);
        self.sessions().save(&room).await?;
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{add_observer, add_participant, engine_with_room};
    use super::*;

    async fn group_ids(engine: &RoomEngine, room_id: Uuid, titles: &[&str]) -> Vec<Uuid> {
        let mut room = None;
        for title in titles {
            let facilitator_id = engine
                .sessions()
                .load(room_id)
                .await
                .unwrap()
                .unwrap()
                .facilitator_id;
            room = Some(
                engine
                    .create_group(room_id, facilitator_id, title.to_string(), None)
                    .await
                    .unwrap(),
            );
        }
        let room = room.expect("at least one group");
        titles
            .iter()
            .map(|t| room.groups.iter().find(|g| g.title == *t).unwrap().id)
            .collect()
    }

    #[tokio::test]
    async fn group_management_is_facilitator_only() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let err = engine
            .create_group(room.id, bob_id, "theme".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let updated = engine
            .create_group(room.id, facilitator_id, "theme".into(), None)
            .await
            .unwrap();
        assert_eq!(updated.groups.len(), 1);
        assert_eq!(updated.groups[0].status, GroupStatus::Pending);
    }

    #[tokio::test]
    async fn delete_group_detaches_notes() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let ids = group_ids(&engine, room.id, &["theme"]).await;
        let note = engine
            .create_postit(room.id, facilitator_id, "x".into(), "well".into(), "#fff".into())
            .await
            .unwrap();
        engine
            .assign_postit_to_group(room.id, facilitator_id, note.id, Some(ids[0]))
            .await
            .unwrap();
        let updated = engine
            .delete_group(room.id, facilitator_id, ids[0])
            .await
            .unwrap();
        assert!(updated.groups.is_empty());
        assert_eq!(updated.postit(note.id).unwrap().group_id, None);
    }

    #[tokio::test]
    async fn vote_budget_spans_all_groups() {
        let (engine, room, _f, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let ids = group_ids(&engine, room.id, &["a", "b"]).await;
        engine.cast_group_vote(room.id, bob_id, ids[0]).await.unwrap();
        engine.cast_group_vote(room.id, bob_id, ids[0]).await.unwrap();
        engine.cast_group_vote(room.id, bob_id, ids[1]).await.unwrap();
        let err = engine
            .cast_group_vote(room.id, bob_id, ids[1])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LimitReached(_)));

        // Retracting frees budget again
        let updated = engine
            .retract_group_vote(room.id, bob_id, ids[0])
            .await
            .unwrap();
        assert_eq!(updated.group(ids[0]).unwrap().votes.len(), 1);
        engine.cast_group_vote(room.id, bob_id, ids[1]).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_respect_the_budget() {
        let (engine, room, _f, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let ids = group_ids(&engine, room.id, &["a"]).await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let engine = engine.clone();
                let (room_id, group_id) = (room.id, ids[0]);
                tokio::spawn(async move { engine.cast_group_vote(room_id, bob_id, group_id).await })
            })
            .collect();
        let mut accepted = 0usize;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, VOTE_BUDGET);

        let loaded = engine.sessions().load(room.id).await.unwrap().unwrap();
        assert_eq!(loaded.group_votes_spent(bob_id), VOTE_BUDGET);
    }

    #[tokio::test]
    async fn retract_without_vote_is_a_conflict() {
        let (engine, room, _f, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let ids = group_ids(&engine, room.id, &["a"]).await;
        let err = engine
            .retract_group_vote(room.id, bob_id, ids[0])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn observer_cannot_vote_on_groups() {
        let (engine, room, _f, _o) = engine_with_room().await;
        let eve_id = add_observer(&engine, room.id, "eve").await;
        let ids = group_ids(&engine, room.id, &["a"]).await;
        let err = engine
            .cast_group_vote(room.id, eve_id, ids[0])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn tie_reset_clears_only_tied_leaders() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let carol_id = add_participant(&engine, room.id, "carol").await;
        let ids = group_ids(&engine, room.id, &["a", "b", "c"]).await;
        // a: 2 votes, b: 2 votes, c: 1 vote
        engine.cast_group_vote(room.id, bob_id, ids[0]).await.unwrap();
        engine.cast_group_vote(room.id, carol_id, ids[0]).await.unwrap();
        engine.cast_group_vote(room.id, bob_id, ids[1]).await.unwrap();
        engine.cast_group_vote(room.id, carol_id, ids[1]).await.unwrap();
        engine.cast_group_vote(room.id, bob_id, ids[2]).await.unwrap();

        let updated = engine.reset_tie_votes(room.id, facilitator_id).await.unwrap();
        assert!(updated.group(ids[0]).unwrap().votes.is_empty());
        assert!(updated.group(ids[1]).unwrap().votes.is_empty());
        assert_eq!(updated.group(ids[2]).unwrap().votes.len(), 1);
    }

    #[tokio::test]
    async fn tie_reset_without_tie_is_a_conflict() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let ids = group_ids(&engine, room.id, &["a", "b"]).await;
        engine.cast_group_vote(room.id, bob_id, ids[0]).await.unwrap();
        let err = engine
            .reset_tie_votes(room.id, facilitator_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn focus_demotes_previous_active_group() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let ids = group_ids(&engine, room.id, &["a", "b"]).await;
        let updated = engine
            .focus_group(room.id, facilitator_id, ids[0])
            .await
            .unwrap();
        assert_eq!(updated.group(ids[0]).unwrap().status, GroupStatus::Active);
        let updated = engine
            .focus_group(room.id, facilitator_id, ids[1])
            .await
            .unwrap();
        assert_eq!(updated.group(ids[0]).unwrap().status, GroupStatus::Pending);
        assert_eq!(updated.group(ids[1]).unwrap().status, GroupStatus::Active);
        assert_eq!(updated.focused_group_id, Some(ids[1]));
    }

    #[tokio::test]
    async fn completion_rotates_to_next_highest_and_ends_clean() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let carol_id = add_participant(&engine, room.id, "carol").await;
        let ids = group_ids(&engine, room.id, &["a", "b"]).await;
        engine.cast_group_vote(room.id, bob_id, ids[0]).await.unwrap();
        engine.cast_group_vote(room.id, carol_id, ids[0]).await.unwrap();
        engine.cast_group_vote(room.id, bob_id, ids[1]).await.unwrap();

        engine.focus_group(room.id, facilitator_id, ids[0]).await.unwrap();
        let updated = engine
            .complete_group_and_focus_next(room.id, facilitator_id, ids[0])
            .await
            .unwrap();
        assert_eq!(updated.group(ids[0]).unwrap().status, GroupStatus::Done);
        assert_eq!(updated.focused_group_id, Some(ids[1]));
        assert_eq!(updated.group(ids[1]).unwrap().status, GroupStatus::Active);

        let updated = engine
            .complete_group_and_focus_next(room.id, facilitator_id, ids[1])
            .await
            .unwrap();
        assert_eq!(updated.group(ids[1]).unwrap().status, GroupStatus::Done);
        assert_eq!(updated.focused_group_id, None);
    }
}
