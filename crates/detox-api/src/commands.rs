//! Command types for the detoxd protocol

use chrono::{DateTime, Local};
use detox_util::{AppName, BlockId, ClientId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    AppBlockView, HealthStatus, InternetBlockView, ProcessView, RoutineRequest, RoutineView,
    StateSnapshot, UnblockOutcome, UnblockTarget, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationFailed,
    NotFound,
    RateLimited,
    HostError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get the current block state
    GetState,

    /// Block an application for a duration, or raise an existing block
    BlockApp { name: AppName, duration: Duration },

    /// Block the internet for a duration, or raise the active block
    BlockInternet { duration: Duration },

    /// Add a duration on top of the active internet block
    ExtendInternet { duration: Duration },

    /// Add a recurring routine
    AddRoutine { routine: RoutineRequest },

    /// Delete a routine (not gated by the cooling period)
    RemoveRoutine { routine_id: BlockId },

    /// Ask for a block to be lifted after the cooling period
    RequestUnblock { target: UnblockTarget },

    /// Cancel an unblock countdown; all countdowns when `target` is absent
    CancelUnblock {
        #[serde(default)]
        target: Option<UnblockTarget>,
    },

    /// Change the cooling period for future unblock requests
    SetCoolingPeriod { duration: Duration },

    /// List running processes (for picking a target)
    ListProcesses,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether the command can change the registry
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::BlockApp { .. }
                | Command::BlockInternet { .. }
                | Command::ExtendInternet { .. }
                | Command::AddRoutine { .. }
                | Command::RemoveRoutine { .. }
                | Command::RequestUnblock { .. }
                | Command::CancelUnblock { .. }
                | Command::SetCoolingPeriod { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(StateSnapshot),
    AppBlocked {
        block: AppBlockView,
    },
    InternetBlocked {
        block: InternetBlockView,
    },
    RoutineAdded {
        routine: RoutineView,
    },
    RoutineRemoved {
        routine_id: BlockId,
    },
    Unblock {
        outcome: UnblockOutcome,
    },
    UnblockCancelled {
        targets: Vec<UnblockTarget>,
    },
    CoolingPeriodSet {
        cooling_period: Duration,
    },
    Processes {
        processes: Vec<ProcessView>,
        observed_at: DateTime<Local>,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}
