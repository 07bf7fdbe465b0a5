//! Action item model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Todo,
    Done,
}

impl Default for ActionStatus {
    fn default() -> Self {
        ActionStatus::Todo
    }
}

/// A follow-up task, optionally linked to a group. The owner is free text,
/// not a participant reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: Uuid,
    pub content: String,
    pub owner_name: Option<String>,
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub status: ActionStatus,
}

impl ActionItem {
    pub fn new(content: String, owner_name: Option<String>, group_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            owner_name,
            group_id,
            status: ActionStatus::Todo,
        }
    }
}
