//! Recovery bridge
//!
//! Rebuilds a structurally valid Room from durable metadata when the fast
//! store has no entry (cold start, eviction, crash). Reconstruction is
//! deliberately lossy: notes, groups, and action items exist only in the
//! fast store and are accepted as lost. What must hold is structure: a
//! resolvable facilitator, the full roster (offline), empty collections, and
//! no focus or timer state.

use tracing::info;

use crate::models::{Participant, ParticipantRole, Room};
use crate::store::RoomMetadata;

/// Build a session aggregate from the durable record.
///
/// Facilitator resolution: the roster entry holding FACILITATOR, else the
/// first roster entry, else the owner id (empty roster). The caller persists
/// the result into the session store so later commands skip the bridge.
pub fn restore_from_metadata(metadata: &RoomMetadata) -> Room {
    let facilitator_id = metadata
        .participants
        .iter()
        .find(|p| p.role == ParticipantRole::Facilitator)
        .map(|p| p.id)
        .or_else(|| metadata.participants.first().map(|p| p.id))
        .unwrap_or(metadata.owner_id);

    let participants = metadata
        .participants
        .iter()
        .map(|record| {
            let mut p = Participant::with_id(
                record.id,
                record.guest_name.clone().unwrap_or_else(|| "User".to_string()),
                record.role,
                record.user_id,
            );
            // No live connection exists for anyone right after recovery
            p.is_online = false;
            p
        })
        .collect();

    let room = Room {
        id: metadata.id,
        name: metadata.name.clone(),
        template: metadata.template,
        columns: metadata.template.default_columns(),
        groups: Vec::new(),
        phase: metadata.phase,
        facilitator_id,
        status: metadata.status,
        has_password: metadata.password_hash.is_some(),
        max_postits_per_user: metadata.max_postits_per_user,
        owner_id: Some(metadata.owner_id),
        timer: None,
        participants,
        postits: Vec::new(),
        focused_postit_id: None,
        focused_group_id: None,
        action_items: Vec::new(),
        created_at: metadata.created_at,
        closed_at: metadata.closed_at,
    };

    info!(room_id = %room.id, participants = room.participants.len(), "Room restored from metadata");
    room
}
