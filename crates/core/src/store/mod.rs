//! Storage layer: fast session store, connection routing, durable metadata

mod connections;
mod metadata;
mod parse;
mod session;

pub use connections::{ConnectionRegistry, ConnectionRoute};
pub use metadata::{MetadataStore, ParticipantRecord, RoomMetadata};
pub use session::SessionStore;
