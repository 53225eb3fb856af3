//! Collaborator traits

use async_trait::async_trait;
use detox_util::AppName;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from process enumeration or termination
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Permission denied terminating {name} (pid {pid})")]
    PermissionDenied { name: String, pid: u32 },

    #[error("Failed to terminate {name} (pid {pid}): {reason}")]
    KillFailed {
        name: String,
        pid: u32,
        reason: String,
    },

    #[error("Process enumeration failed: {0}")]
    Enumeration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from network control
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("No network backend available: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProcessResult<T> = Result<T, ProcessError>;
pub type NetworkResult<T> = Result<T, NetworkError>;

/// A running process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Process image name, compared case-insensitively against [`AppName`]
    pub name: String,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// What a terminate call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminateReport {
    /// PIDs that were signalled
    pub killed: Vec<u32>,
}

impl TerminateReport {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn killed_any(&self) -> bool {
        !self.killed.is_empty()
    }
}

/// Lists and terminates processes by image name
#[async_trait]
pub trait ProcessController: Send + Sync {
    async fn list_processes(&self) -> ProcessResult<Vec<ProcessInfo>>;

    /// Terminate every process whose name matches `name`.
    ///
    /// Succeeds with an empty report when nothing matches.
    async fn terminate(&self, name: &AppName) -> ProcessResult<TerminateReport>;
}

/// Switches network connectivity on or off
#[async_trait]
pub trait NetworkController: Send + Sync {
    async fn set_network_enabled(&self, enabled: bool) -> NetworkResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_report_none_killed_nothing() {
        let report = TerminateReport::none();
        assert!(!report.killed_any());
    }

    #[test]
    fn process_info_serialization() {
        let info = ProcessInfo::new(42, "game.exe");
        let json = serde_json::to_string(&info).unwrap();
        let parsed: ProcessInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, parsed);
    }

    #[test]
    fn error_messages_name_the_target() {
        let err = ProcessError::PermissionDenied {
            name: "game.exe".into(),
            pid: 7,
        };
        assert!(err.to_string().contains("game.exe"));
    }
}
