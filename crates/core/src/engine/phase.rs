//! Phase progression. Transitions move one step at a time, with the
//! optional brainstorm phase bridged by the Voting/Actions adjacency.

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Group, Phase, Room};
use crate::permissions::RoomAction;

use super::RoomEngine;

impl RoomEngine {
    /// Every ungrouped note gets a singleton group seeded from the note so
    /// the voting phase always ranks groups, never bare notes
    fn synthesize_groups(room: &mut Room) {
        let mut created = 0usize;
        for i in 0..room.postits.len() {
            if room.postits[i].group_id.is_some() {
                continue;
            }
            let group = Group::new(
                room.postits[i].content.clone(),
                room.postits[i].color.clone(),
            );
            room.postits[i].group_id = Some(group.id);
            room.groups.push(group);
            created += 1;
        }
        if created > 0 {
            info!(room_id = %room.id, created, "Ungrouped notes wrapped into singleton groups");
        }
    }

    /// Move the room to an adjacent phase, applying entry and exit effects
    pub async fn change_phase(&self, room_id: Uuid, actor_id: Uuid, to: Phase) -> Result<Room> {
        let lock = self.sessions().room_lock(room_id).await;
        let _guard = lock.lock().await;
        let mut room = self.load_required(room_id).await?;
        Self::require_active(&room)?;
        Self::authorize(&room, actor_id, RoomAction::ChangePhase)?;
        if !Phase::step_allowed(room.phase, to) {
            return Err(Error::Conflict(format!(
                "cannot move from {} to {}",
                room.phase.as_str(),
                to.as_str()
            )));
        }
        if to == Phase::Voting {
            Self::synthesize_groups(&mut room);
        }
        if room.phase == Phase::Actions && to != Phase::Actions {
            room.focused_group_id = None;
        }
        let from = room.phase;
        room.phase = to;
        if to == Phase::Actions {
            Self::focus_top_voted(&mut room);
        }
        self.sessions().save(&room).await?;
        if let Some(store) = self.metadata() {
            if let Err(e) = store.update_phase(room_id, to) {
                warn!(room_id = %room_id, error = %e, "Phase not persisted");
            }
        }
        info!(room_id = %room_id, from = %from.as_str(), to = %to.as_str(), "Phase changed");
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{add_participant, engine_with_room};
    use super::*;
    use crate::models::GroupStatus;

    async fn advance(engine: &RoomEngine, room_id: Uuid, actor: Uuid, phases: &[Phase]) -> Room {
        let mut room = None;
        for phase in phases {
            room = Some(engine.change_phase(room_id, actor, *phase).await.unwrap());
        }
        room.expect("at least one phase")
    }

    #[tokio::test]
    async fn phase_moves_one_step_at_a_time() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let err = engine
            .change_phase(room.id, facilitator_id, Phase::Voting)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        let updated = engine
            .change_phase(room.id, facilitator_id, Phase::Ideation)
            .await
            .unwrap();
        assert_eq!(updated.phase, Phase::Ideation);
        // Backwards by one step is allowed too
        let updated = engine
            .change_phase(room.id, facilitator_id, Phase::Setup)
            .await
            .unwrap();
        assert_eq!(updated.phase, Phase::Setup);
    }

    #[tokio::test]
    async fn phase_change_is_facilitator_only() {
        let (engine, room, _f, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let err = engine
            .change_phase(room.id, bob_id, Phase::Ideation)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn brainstorm_can_be_skipped_both_ways() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let updated = advance(
            &engine,
            room.id,
            facilitator_id,
            &[
                Phase::Ideation,
                Phase::Discussion,
                Phase::Grouping,
                Phase::Voting,
                Phase::Actions,
            ],
        )
        .await;
        assert_eq!(updated.phase, Phase::Actions);
        let updated = engine
            .change_phase(room.id, facilitator_id, Phase::Voting)
            .await
            .unwrap();
        assert_eq!(updated.phase, Phase::Voting);
        // The long way round still steps through brainstorm
        let updated = advance(
            &engine,
            room.id,
            facilitator_id,
            &[Phase::Brainstorm, Phase::Actions, Phase::Conclusion],
        )
        .await;
        assert_eq!(updated.phase, Phase::Conclusion);
    }

    #[tokio::test]
    async fn entering_voting_wraps_ungrouped_notes() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let grouped = engine
            .create_postit(room.id, bob_id, "grouped".into(), "well".into(), "#abc".into())
            .await
            .unwrap();
        let loose = engine
            .create_postit(room.id, bob_id, "loose".into(), "well".into(), "#def".into())
            .await
            .unwrap();
        let with_group = engine
            .create_group(room.id, facilitator_id, "theme".into(), None)
            .await
            .unwrap();
        let theme_id = with_group.groups[0].id;
        engine
            .assign_postit_to_group(room.id, facilitator_id, grouped.id, Some(theme_id))
            .await
            .unwrap();

        let updated = advance(
            &engine,
            room.id,
            facilitator_id,
            &[Phase::Ideation, Phase::Discussion, Phase::Grouping, Phase::Voting],
        )
        .await;
        // One pre-existing group plus one singleton for the loose note
        assert_eq!(updated.groups.len(), 2);
        let singleton = updated
            .groups
            .iter()
            .find(|g| g.id != theme_id)
            .unwrap();
        assert_eq!(singleton.title, "loose");
        assert_eq!(singleton.color, "#def");
        assert_eq!(updated.postit(loose.id).unwrap().group_id, Some(singleton.id));
        assert_eq!(updated.postit(grouped.id).unwrap().group_id, Some(theme_id));
    }

    #[tokio::test]
    async fn entering_actions_focuses_top_voted_group() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let bob_id = add_participant(&engine, room.id, "bob").await;
        let carol_id = add_participant(&engine, room.id, "carol").await;
        engine
            .create_postit(room.id, bob_id, "first".into(), "well".into(), "#aaa".into())
            .await
            .unwrap();
        engine
            .create_postit(room.id, carol_id, "second".into(), "well".into(), "#bbb".into())
            .await
            .unwrap();
        let updated = advance(
            &engine,
            room.id,
            facilitator_id,
            &[Phase::Ideation, Phase::Discussion, Phase::Grouping, Phase::Voting],
        )
        .await;
        let second_id = updated
            .groups
            .iter()
            .find(|g| g.title == "second")
            .unwrap()
            .id;
        engine.cast_group_vote(room.id, bob_id, second_id).await.unwrap();

        let updated = engine
            .change_phase(room.id, facilitator_id, Phase::Actions)
            .await
            .unwrap();
        assert_eq!(updated.focused_group_id, Some(second_id));
        assert_eq!(updated.group(second_id).unwrap().status, GroupStatus::Active);

        // Leaving ACTIONS clears the shared focus
        let updated = engine
            .change_phase(room.id, facilitator_id, Phase::Conclusion)
            .await
            .unwrap();
        assert_eq!(updated.focused_group_id, None);
    }

    #[tokio::test]
    async fn entering_actions_with_no_groups_leaves_focus_clear() {
        let (engine, room, facilitator_id, _o) = engine_with_room().await;
        let updated = advance(
            &engine,
            room.id,
            facilitator_id,
            &[
                Phase::Ideation,
                Phase::Discussion,
                Phase::Grouping,
                Phase::Voting,
                Phase::Actions,
            ],
        )
        .await;
        assert_eq!(updated.phase, Phase::Actions);
        assert_eq!(updated.focused_group_id, None);
    }
}
