//! Linux collaborators for detoxd
//!
//! Provides:
//! - Process enumeration (sysinfo) and termination by name (SIGKILL)
//! - Network switching with auto-detection of NetworkManager (`nmcli`) or
//!   iproute2 (`ip link`)

mod network;
mod process;

pub use network::*;
pub use process::*;
