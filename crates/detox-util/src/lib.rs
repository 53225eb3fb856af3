//! Shared utilities for detoxd
//!
//! This crate provides:
//! - ID types (AppName, BlockId, ClientId)
//! - Time utilities (clocks, wall-clock windows, day masks, duration helpers)
//! - Parse errors for user-supplied times and days
//! - Rate limiting helpers
//! - Default paths for socket, data, and config files

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
