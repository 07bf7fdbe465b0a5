//! Core data model for retrospective sessions

mod action;
mod column;
mod group;
mod participant;
mod postit;
mod room;
mod timer;

pub use action::{ActionItem, ActionStatus};
pub use column::{Column, Template};
pub use group::{Group, GroupStatus, VOTE_BUDGET};
pub use participant::{Participant, ParticipantRole};
pub use postit::{Position, StickyNote};
pub use room::{Phase, Room, RoomStatus, RoomSummary, VoteStandings};
pub use timer::Timer;
