//! Board templates and their fixed column sets

use serde::{Deserialize, Serialize};

/// Board template selecting the default note columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Template {
    Classic,
    Starfish,
}

impl Template {
    /// The fixed column set for this template, derived once at room creation
    pub fn default_columns(self) -> Vec<Column> {
        match self {
            Template::Starfish => vec![
                Column::new("keep", "Keep", "#4caf50"),
                Column::new("drop", "Drop", "#f44336"),
                Column::new("start", "Start", "#2196f3"),
                Column::new("stop", "Stop", "#ff9800"),
                Column::new("more", "More of", "#9c27b0"),
                Column::new("less", "Less of", "#795548"),
            ],
            Template::Classic => vec![
                Column::new("well", "What went well", "#4caf50"),
                Column::new("not_well", "What didn't go well", "#f44336"),
                Column::new("actions", "Action items", "#2196f3"),
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Template::Classic => "CLASSIC",
            Template::Starfish => "STARFISH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLASSIC" => Some(Template::Classic),
            "STARFISH" => Some(Template::Starfish),
            _ => None,
        }
    }
}

/// A note column on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    pub color: String,
}

impl Column {
    fn new(id: &str, title: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            color: color.to_string(),
        }
    }
}
