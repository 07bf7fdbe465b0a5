//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::{GroupStatus, ParticipantRole, Room, VOTE_BUDGET};

/// Validate that a Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    // The facilitator pointer must resolve to a FACILITATOR participant
    // whenever the room has any participants at all
    if !room.participants.is_empty() {
        let resolved = room
            .participant(room.facilitator_id)
            .map(|p| p.role == ParticipantRole::Facilitator);
        debug_assert!(
            resolved == Some(true),
            "Room {} facilitator_id {} does not resolve to a FACILITATOR",
            room.id,
            room.facilitator_id
        );
    }

    // At most one group is ACTIVE at a time
    let active = room
        .groups
        .iter()
        .filter(|g| g.status == GroupStatus::Active)
        .count();
    debug_assert!(
        active <= 1,
        "Room {} has {} ACTIVE groups, expected 0 or 1",
        room.id,
        active
    );

    // Focus pointers must resolve or be null
    if let Some(id) = room.focused_postit_id {
        debug_assert!(
            room.postit(id).is_some(),
            "Room {} focused_postit_id {} is dangling",
            room.id,
            id
        );
    }
    if let Some(id) = room.focused_group_id {
        debug_assert!(
            room.group(id).is_some(),
            "Room {} focused_group_id {} is dangling",
            room.id,
            id
        );
    }

    // No participant may exceed the group-vote budget
    for p in &room.participants {
        let spent = room.group_votes_spent(p.id);
        debug_assert!(
            spent <= VOTE_BUDGET,
            "Room {} participant {} spent {} votes (budget {})",
            room.id,
            p.id,
            spent,
            VOTE_BUDGET
        );
    }

    debug_assert!(!room.name.trim().is_empty(), "Room {} has empty name", room.id);
}
