//! Block engine for detoxd
//!
//! This crate is the heart of detoxd, containing:
//! - The block registry (app, routine and internet blocks plus the cooling period)
//! - Window evaluation (what must be blocked right now, what is coming up)
//! - The unblock gate (cooling-off countdown before a block can be lifted)
//! - Target workers that keep killing a blocked app until its block ends
//! - The reconciler that converges workers and network state on the registry
//! - The engine actor, the single writer of the registry

mod actor;
mod engine;
mod error;
mod events;
mod gate;
mod reconciler;
mod registry;
mod window;
mod worker;

pub use actor::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use gate::*;
pub use reconciler::*;
pub use registry::*;
pub use window::*;
pub use worker::*;
