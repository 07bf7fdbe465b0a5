//! Topic group model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Total group votes each participant may spend across all groups
pub const VOTE_BUDGET: usize = 3;

/// Workflow status driving the single-topic focus during the ACTIONS phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Pending,
    Active,
    Done,
}

impl Default for GroupStatus {
    fn default() -> Self {
        GroupStatus::Pending
    }
}

/// A named cluster of notes, the unit of voting and of the ACTIONS-phase
/// focus workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub title: String,
    pub color: String,
    /// Budgeted multi-vote: the same participant id may appear several times
    #[serde(default)]
    pub votes: Vec<Uuid>,
    /// Snapshots persisted before the focus workflow existed omit this
    #[serde(default)]
    pub status: GroupStatus,
}

impl Group {
    pub fn new(title: String, color: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            color,
            votes: Vec::new(),
            status: GroupStatus::Pending,
        }
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Remove exactly one occurrence of the participant's vote, if any
    pub fn retract_vote(&mut self, participant_id: Uuid) -> bool {
        if let Some(pos) = self.votes.iter().position(|v| *v == participant_id) {
            self.votes.remove(pos);
            true
        } else {
            false
        }
    }
}
