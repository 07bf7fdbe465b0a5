//! Retroboard Network Library
//!
//! TCP front end for the room engine.
//!
//! # Architecture
//!
//! - **Server**: accepts connections, routes commands to the engine, and
//!   broadcasts room updates to everyone in the room
//! - **Protocol**: length-prefixed JSON frames; `Hello` first, then commands
//!
//! A connection acts as the participant it joined a room as. Commands
//! against a room the connection never joined are rejected.

pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};
pub use protocol::{ClientCommand, RoomCheckInfo, ServerEvent};
pub use server::Server;

/// Default port for Retroboard servers
pub const DEFAULT_PORT: u16 = 7410;
