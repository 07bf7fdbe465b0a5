//! Participant and role models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a participant within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    /// Exclusive management rights: phase, timer, groups, roles, room lifecycle
    Facilitator,
    /// Standard member: authors notes, votes
    Participant,
    /// Read-mostly: cannot create notes or vote
    Observer,
}

impl Default for ParticipantRole {
    fn default() -> Self {
        ParticipantRole::Participant
    }
}

impl ParticipantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantRole::Facilitator => "FACILITATOR",
            ParticipantRole::Participant => "PARTICIPANT",
            ParticipantRole::Observer => "OBSERVER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FACILITATOR" => Some(ParticipantRole::Facilitator),
            "PARTICIPANT" => Some(ParticipantRole::Participant),
            "OBSERVER" => Some(ParticipantRole::Observer),
            _ => None,
        }
    }
}

/// A member of a room. Participants are never deleted: leaving only flips
/// `is_online`, so the participant list grows monotonically for the life of
/// the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    /// Snapshots persisted before roles existed may omit this; `Room::normalize`
    /// repairs the facilitator entry after load.
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub is_guest: bool,
    /// Durable identity link for authenticated users
    pub user_id: Option<Uuid>,
}

impl Participant {
    pub fn new(name: String, role: ParticipantRole, user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            is_online: true,
            is_guest: user_id.is_none(),
            user_id,
        }
    }

    /// Build a participant with a pre-assigned id (durable record ids win
    /// over freshly generated ones so recovery can match them up later)
    pub fn with_id(id: Uuid, name: String, role: ParticipantRole, user_id: Option<Uuid>) -> Self {
        Self {
            id,
            name,
            role,
            is_online: true,
            is_guest: user_id.is_none(),
            user_id,
        }
    }
}
