//! Protocol types for detoxd IPC
//!
//! This crate defines the stable API between detoxd and its clients:
//! - Commands (requests from clients)
//! - Responses
//! - Events (daemon -> clients)
//! - Read-only views of the block state
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
