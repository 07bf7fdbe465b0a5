//! Room aggregate - the unit everything else hangs off
//!
//! A Room serializes as one JSON document per session. Derived facts (vote
//! standings, reveal state) are recomputed on every read, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ActionItem, Column, Group, GroupStatus, Participant, ParticipantRole, StickyNote, Template,
    Timer, VOTE_BUDGET,
};

/// Stage of the retrospective ceremony, gating what actions are permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Setup,
    Ideation,
    Discussion,
    Grouping,
    Voting,
    Brainstorm,
    Actions,
    Conclusion,
}

impl Phase {
    const ORDER: [Phase; 8] = [
        Phase::Setup,
        Phase::Ideation,
        Phase::Discussion,
        Phase::Grouping,
        Phase::Voting,
        Phase::Brainstorm,
        Phase::Actions,
        Phase::Conclusion,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|p| *p == self).unwrap_or(0)
    }

    /// Single-step transitions only, forward or backward. BRAINSTORM is an
    /// optional stop: VOTING and ACTIONS are adjacent both through it and
    /// around it.
    pub fn step_allowed(from: Phase, to: Phase) -> bool {
        if from == to {
            return false;
        }
        let delta = from.index().abs_diff(to.index());
        if delta == 1 {
            return true;
        }
        matches!(
            (from, to),
            (Phase::Voting, Phase::Actions) | (Phase::Actions, Phase::Voting)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "SETUP",
            Phase::Ideation => "IDEATION",
            Phase::Discussion => "DISCUSSION",
            Phase::Grouping => "GROUPING",
            Phase::Voting => "VOTING",
            Phase::Brainstorm => "BRAINSTORM",
            Phase::Actions => "ACTIONS",
            Phase::Conclusion => "CONCLUSION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|p| p.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Active,
    Closed,
    Archived,
}

impl Default for RoomStatus {
    fn default() -> Self {
        RoomStatus::Active
    }
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Active => "ACTIVE",
            RoomStatus::Closed => "CLOSED",
            RoomStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(RoomStatus::Active),
            "CLOSED" => Some(RoomStatus::Closed),
            "ARCHIVED" => Some(RoomStatus::Archived),
            _ => None,
        }
    }
}

/// Derived group-vote facts, recomputed on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteStandings {
    /// Highest vote count among groups (0 when there are no groups)
    pub max_votes: usize,
    /// Ids of every group at `max_votes`; a tie means more than one entry
    pub tied_groups: Vec<Uuid>,
}

impl VoteStandings {
    pub fn has_tie(&self) -> bool {
        self.max_votes > 0 && self.tied_groups.len() > 1
    }
}

/// One retrospective session; the aggregate root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub template: Template,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub groups: Vec<Group>,
    pub phase: Phase,
    /// Participant currently holding facilitation authority. Distinct from
    /// `owner_id`, the durable-identity creator, which never changes.
    pub facilitator_id: Uuid,
    #[serde(default)]
    pub status: RoomStatus,
    /// The secret itself lives only in durable storage
    #[serde(default)]
    pub has_password: bool,
    pub max_postits_per_user: Option<u32>,
    pub owner_id: Option<Uuid>,
    pub timer: Option<Timer>,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub postits: Vec<StickyNote>,
    #[serde(default)]
    pub focused_postit_id: Option<Uuid>,
    #[serde(default)]
    pub focused_group_id: Option<Uuid>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn new(
        id: Uuid,
        name: String,
        template: Template,
        facilitator: Participant,
        owner_id: Option<Uuid>,
        has_password: bool,
        max_postits_per_user: Option<u32>,
    ) -> Self {
        let facilitator_id = facilitator.id;
        Self {
            id,
            name,
            template,
            columns: template.default_columns(),
            groups: Vec::new(),
            phase: Phase::Setup,
            facilitator_id,
            status: RoomStatus::Active,
            has_password,
            max_postits_per_user,
            owner_id,
            timer: None,
            participants: vec![facilitator],
            postits: Vec::new(),
            focused_postit_id: None,
            focused_group_id: None,
            action_items: Vec::new(),
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Repair rules applied on every load. Structurally older snapshots get
    /// their missing fields defaulted by serde; this fixes what serde cannot
    /// know: the facilitator role inference and dangling focus pointers.
    pub fn normalize(&mut self) {
        let facilitator_id = self.facilitator_id;
        if let Some(p) = self.participants.iter_mut().find(|p| p.id == facilitator_id) {
            p.role = ParticipantRole::Facilitator;
        }
        if let Some(id) = self.focused_postit_id {
            if self.postit(id).is_none() {
                self.focused_postit_id = None;
            }
        }
        if let Some(id) = self.focused_group_id {
            if self.group(id).is_none() {
                self.focused_group_id = None;
            }
        }
    }

    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: Uuid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn participant_by_user(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == Some(user_id))
    }

    pub fn postit(&self, id: Uuid) -> Option<&StickyNote> {
        self.postits.iter().find(|p| p.id == id)
    }

    pub fn postit_mut(&mut self, id: Uuid) -> Option<&mut StickyNote> {
        self.postits.iter_mut().find(|p| p.id == id)
    }

    pub fn group(&self, id: Uuid) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: Uuid) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    /// Group votes this participant has spent, across all groups
    pub fn group_votes_spent(&self, participant_id: Uuid) -> usize {
        self.groups
            .iter()
            .map(|g| g.votes.iter().filter(|v| **v == participant_id).count())
            .sum()
    }

    /// Votes are revealed once every participant has fully spent their budget
    pub fn votes_revealed(&self) -> bool {
        let total: usize = self.groups.iter().map(Group::vote_count).sum();
        total >= self.participants.len() * VOTE_BUDGET
    }

    pub fn vote_standings(&self) -> VoteStandings {
        let max_votes = self.groups.iter().map(Group::vote_count).max().unwrap_or(0);
        let tied_groups = if max_votes == 0 {
            Vec::new()
        } else {
            self.groups
                .iter()
                .filter(|g| g.vote_count() == max_votes)
                .map(|g| g.id)
                .collect()
        };
        VoteStandings { max_votes, tied_groups }
    }

    /// Highest-voted group that is not DONE, ties broken by first-encountered
    /// order. Used by the ACTIONS-phase focus rotation.
    pub fn top_pending_group(&self) -> Option<&Group> {
        let best = self
            .groups
            .iter()
            .filter(|g| g.status == GroupStatus::Pending)
            .map(Group::vote_count)
            .max()?;
        self.groups
            .iter()
            .find(|g| g.status == GroupStatus::Pending && g.vote_count() == best)
    }
}

/// Condensed view for owner listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub name: String,
    pub template: Template,
    pub status: RoomStatus,
    pub phase: Phase,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}
