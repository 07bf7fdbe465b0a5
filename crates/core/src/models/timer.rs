//! Session timer model
//!
//! Only the timer's value state lives here. The server-side tick task is a
//! runtime resource tracked by `TimerRegistry` and is never serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    /// Initial duration in seconds
    pub duration: u32,
    /// Seconds left, decremented once per second by the tick task
    pub remaining: u32,
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl Timer {
    pub fn start(duration: u32) -> Self {
        Self {
            duration,
            remaining: duration,
            is_running: true,
            started_at: Some(Utc::now()),
        }
    }
}
