//! Retroboard Core Library
//!
//! Domain model, command engine, permissions, and storage for the
//! Retroboard session engine.

pub mod engine;
pub mod error;
pub mod invariants;
pub mod models;
pub mod permissions;
pub mod recovery;
pub mod store;
pub mod timer;

pub use engine::{ActionItemPatch, Caller, EngineEvent, NewRoom, RoomCheck, RoomEngine};
pub use error::{Error, Result};
pub use models::*;
pub use permissions::*;
pub use store::{
    ConnectionRegistry, ConnectionRoute, MetadataStore, ParticipantRecord, RoomMetadata,
    SessionStore,
};
pub use timer::TimerRegistry;
