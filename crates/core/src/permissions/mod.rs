//! Permission system for room operations

use crate::models::{ParticipantRole, Phase};

/// Actions that can be performed in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    // Notes
    CreateNote,
    EditOwnNote,
    MoveNote,
    GroupNote,

    // Voting (note toggle and group budget votes share the observer bar)
    Vote,

    // Topic groups
    ManageGroups,
    FocusGroup,

    // Session management
    ChangePhase,
    ManageTimer,
    ChangeRoles,
    ManageRoom,
}

/// Capability matrix for participant roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a role may perform an action
    pub fn can_perform(role: ParticipantRole, action: RoomAction) -> bool {
        match action {
            // Observers are read-mostly: no authoring, no voting
            RoomAction::CreateNote
            | RoomAction::EditOwnNote
            | RoomAction::MoveNote
            | RoomAction::GroupNote
            | RoomAction::Vote => role != ParticipantRole::Observer,

            // Facilitator-only management surface
            RoomAction::ManageGroups
            | RoomAction::FocusGroup
            | RoomAction::ChangePhase
            | RoomAction::ManageTimer
            | RoomAction::ChangeRoles
            | RoomAction::ManageRoom => role == ParticipantRole::Facilitator,
        }
    }

    /// Phase gate for note content edits: SETUP/IDEATION author only,
    /// DISCUSSION author or facilitator, locked everywhere else. Move and
    /// group reassignment are not gated by this.
    pub fn can_edit_note(phase: Phase, is_author: bool, role: ParticipantRole) -> bool {
        match phase {
            Phase::Setup | Phase::Ideation => is_author && role != ParticipantRole::Observer,
            Phase::Discussion => is_author || role == ParticipantRole::Facilitator,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facilitator_permissions() {
        assert!(PermissionMatrix::can_perform(ParticipantRole::Facilitator, RoomAction::ChangePhase));
        assert!(PermissionMatrix::can_perform(ParticipantRole::Facilitator, RoomAction::ManageGroups));
        assert!(PermissionMatrix::can_perform(ParticipantRole::Facilitator, RoomAction::Vote));
    }

    #[test]
    fn test_participant_permissions() {
        assert!(PermissionMatrix::can_perform(ParticipantRole::Participant, RoomAction::CreateNote));
        assert!(PermissionMatrix::can_perform(ParticipantRole::Participant, RoomAction::Vote));
        assert!(!PermissionMatrix::can_perform(ParticipantRole::Participant, RoomAction::ChangePhase));
        assert!(!PermissionMatrix::can_perform(ParticipantRole::Participant, RoomAction::ManageGroups));
    }

    #[test]
    fn test_observer_permissions() {
        assert!(!PermissionMatrix::can_perform(ParticipantRole::Observer, RoomAction::CreateNote));
        assert!(!PermissionMatrix::can_perform(ParticipantRole::Observer, RoomAction::Vote));
        assert!(!PermissionMatrix::can_perform(ParticipantRole::Observer, RoomAction::MoveNote));
    }

    #[test]
    fn test_note_edit_phase_gate() {
        // Author during ideation
        assert!(PermissionMatrix::can_edit_note(Phase::Ideation, true, ParticipantRole::Participant));
        // Someone else during ideation
        assert!(!PermissionMatrix::can_edit_note(Phase::Ideation, false, ParticipantRole::Participant));
        // Facilitator may touch any note during discussion
        assert!(PermissionMatrix::can_edit_note(Phase::Discussion, false, ParticipantRole::Facilitator));
        // Content is frozen from grouping onward
        assert!(!PermissionMatrix::can_edit_note(Phase::Grouping, true, ParticipantRole::Facilitator));
        assert!(!PermissionMatrix::can_edit_note(Phase::Voting, true, ParticipantRole::Participant));
    }
}
