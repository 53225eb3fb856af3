//! Core events emitted by the engine and reconciler

use chrono::{DateTime, Local};
use detox_api::{CountdownView, UnblockTarget};
use detox_util::{AppName, BlockId};
use std::time::Duration;

/// Events emitted by the block engine and the reconciler
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// App block created or raised
    AppBlocked {
        name: AppName,
        until: DateTime<Local>,
    },

    /// Internet block created, raised or extended
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

    /// Blocks for the target were removed
    UnblockCommitted {
        target: UnblockTarget,
    },

    CoolingPeriodChanged {
        cooling_period: Duration,
    },

    /// A worker started for an app
    EnforcementStarted {
        name: AppName,
        until: DateTime<Local>,
    },

    /// An app's worker was stopped
    EnforcementStopped {
        name: AppName,
    },

    /// Network was switched off (`true`) or back on (`false`)
    NetworkEnforcement {
        blocked: bool,
    },
}

impl CoreEvent {
    /// Whether the event follows a change to the persisted registry
    pub fn changes_registry(&self) -> bool {
        matches!(
            self,
            CoreEvent::AppBlocked { .. }
                | CoreEvent::InternetBlocked { .. }
                | CoreEvent::RoutineAdded { .. }
                | CoreEvent::RoutineRemoved { .. }
                | CoreEvent::UnblockCommitted { .. }
                | CoreEvent::CoolingPeriodChanged { .. }
        )
    }
}
