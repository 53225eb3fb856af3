//! Event types for detoxd -> client streaming

use chrono::{DateTime, Local};
use detox_util::{AppName, BlockId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CountdownView, StateSnapshot, UnblockTarget, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: detox_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and major changes)
    StateChanged(StateSnapshot),

    AppBlocked {
        name: AppName,
        until: DateTime<Local>,
    },

    InternetBlocked {
        until: DateTime<Local>,
    },

    RoutineAdded {
        routine_id: BlockId,
    },

    RoutineRemoved {
        routine_id: BlockId,
    },

    UnblockCountdownStarted {
        countdown: CountdownView,
    },

    UnblockCancelled {
        target: UnblockTarget,
    },

    UnblockCommitted {
        target: UnblockTarget,
    },

    CoolingPeriodChanged {
        cooling_period: Duration,
    },

    /// The reconciler began terminating an application
    EnforcementStarted {
        name: AppName,
        until: DateTime<Local>,
    },

    /// The reconciler stopped terminating an application
    EnforcementStopped {
        name: AppName,
    },

    /// Network enforcement changed
    NetworkEnforcement {
        blocked: bool,
    },

    /// Daemon is shutting down
    Shutdown,
}
