//! Collaborator interfaces for detoxd
//!
//! The block engine never touches the operating system directly. It asks a
//! [`ProcessController`] to list and terminate processes and a
//! [`NetworkController`] to switch connectivity. This crate contains no
//! platform code; see `detox-host-linux` for the Linux implementations and
//! [`MockProcessController`] / [`MockNetworkController`] for tests.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
