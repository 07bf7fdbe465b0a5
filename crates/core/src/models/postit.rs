//! Sticky note model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free position of a note on the board
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// The atomic unit of feedback authored by a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    /// Denormalized at creation time; not updated if the author renames later
    pub author_name: String,
    /// Toggle votes: a participant id is present at most once
    #[serde(default)]
    pub votes: Vec<Uuid>,
    pub group_id: Option<Uuid>,
    pub column_id: String,
    pub color: String,
    #[serde(default)]
    pub position: Position,
}

impl StickyNote {
    pub fn new(content: String, author_id: Uuid, author_name: String, column_id: String, color: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            author_id,
            author_name,
            votes: Vec::new(),
            group_id: None,
            column_id,
            color,
            position: Position::default(),
        }
    }

    /// Toggle semantics: casting while present removes the vote
    pub fn toggle_vote(&mut self, participant_id: Uuid) {
        if let Some(pos) = self.votes.iter().position(|v| *v == participant_id) {
            self.votes.remove(pos);
        } else {
            self.votes.push(participant_id);
        }
    }
}
