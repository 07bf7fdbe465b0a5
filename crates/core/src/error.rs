//! Error types for the session engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Referenced room, participant, note, group, or action does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller's role or the current phase does not permit the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Business-rule cap exceeded (note limit, vote budget)
    #[error("Limit reached: {0}")]
    LimitReached(String),

    /// Requested transition is a no-op or invalid for the current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The durable metadata store failed during a mandatory call
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
