//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire. The
//! first frame on every connection must be `Hello`; everything else is
//! rejected until the connection is introduced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use retroboard_core::models::{
    ActionStatus, Participant, ParticipantRole, Phase, Room, RoomStatus, RoomSummary, StickyNote,
    Template,
};

/// Commands a client sends to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Mandatory first frame; a missing user id means a guest connection
    Hello { user_id: Option<Uuid> },

    // Room lifecycle
    CreateRoom {
        name: String,
        template: Template,
        facilitator_name: String,
        password: Option<String>,
        max_postits_per_user: Option<u32>,
    },
    JoinRoom {
        room_id: Uuid,
        name: String,
        password: Option<String>,
        #[serde(default)]
        as_observer: bool,
    },
    RejoinRoom { room_id: Uuid, participant_id: Uuid },
    CheckRoom { room_id: Uuid },
    ListRooms,
    CloseRoom { room_id: Uuid },
    ReopenRoom { room_id: Uuid },
    DeleteRoom { room_id: Uuid },
    SetRole { room_id: Uuid, participant_id: Uuid, role: ParticipantRole },

    // Phase
    ChangePhase { room_id: Uuid, phase: Phase },

    // Post-its
    CanCreatePostit { room_id: Uuid },
    CreatePostit {
        room_id: Uuid,
        content: String,
        column_id: String,
        color: String,
    },
    UpdatePostit { room_id: Uuid, postit_id: Uuid, content: String },
    MovePostit { room_id: Uuid, postit_id: Uuid, column_id: String },
    AssignPostitToGroup {
        room_id: Uuid,
        postit_id: Uuid,
        group_id: Option<Uuid>,
    },
    TogglePostitVote { room_id: Uuid, postit_id: Uuid },
    FocusPostit { room_id: Uuid, postit_id: Option<Uuid> },

    // Groups
    CreateGroup { room_id: Uuid, title: String, color: Option<String> },
    RenameGroup { room_id: Uuid, group_id: Uuid, title: String },
    DeleteGroup { room_id: Uuid, group_id: Uuid },
    CastGroupVote { room_id: Uuid, group_id: Uuid },
    RetractGroupVote { room_id: Uuid, group_id: Uuid },
    ResetTieVotes { room_id: Uuid },
    FocusGroup { room_id: Uuid, group_id: Uuid },
    CompleteGroup { room_id: Uuid, group_id: Uuid },

    // Action items
    CreateAction {
        room_id: Uuid,
        content: String,
        owner_name: Option<String>,
        group_id: Option<Uuid>,
    },
    UpdateAction {
        room_id: Uuid,
        action_id: Uuid,
        content: Option<String>,
        owner_name: Option<String>,
        group_id: Option<Uuid>,
        status: Option<ActionStatus>,
    },
    DeleteAction { room_id: Uuid, action_id: Uuid },

    // Timer
    StartTimer { room_id: Uuid, duration_secs: u32 },
    StopTimer { room_id: Uuid },

    /// Ping to keep connection alive
    Ping,
}

/// Pre-join probe answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCheckInfo {
    pub id: Uuid,
    pub name: String,
    pub status: RoomStatus,
    pub requires_password: bool,
}

/// Events the server sends to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// First frame on every connection, after a valid `Hello`
    Welcome { connection_id: Uuid },

    /// Reply to the creator
    RoomCreated { room: Room },

    /// Reply to the joiner, carrying their own roster entry
    RoomJoined { room: Room, participant: Participant },

    /// Broadcast to the rest of the room when somebody joins
    ParticipantJoined { room: Room, participant: Participant },
    ParticipantStatus { room_id: Uuid, participant_id: Uuid, is_online: bool },

    /// Reply to `CheckRoom`
    RoomChecked { info: RoomCheckInfo },

    /// Reply to `ListRooms`
    RoomList { rooms: Vec<RoomSummary> },

    /// Reply to `CanCreatePostit`; `reason` explains a denial
    PostitAllowance {
        room_id: Uuid,
        allowed: bool,
        reason: Option<String>,
    },

    /// Broadcast for every mutation that changes the whole aggregate
    RoomUpdated { room: Room },

    /// Broadcast when a note is created
    PostitCreated { room_id: Uuid, postit: StickyNote },

    /// Broadcast to a room's connections just before their routes drop
    RoomDeleted { room_id: Uuid },

    /// Sent only to the connection whose command failed
    Error { message: String },

    /// Pong response to ping
    Pong,
}
