//! Audit event types

use chrono::{DateTime, Local};
use detox_api::UnblockTarget;
use detox_util::{AppName, BlockId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    DaemonStarted,

    DaemonStopped,

    /// Registry restored from the snapshot at startup
    SnapshotRestored {
        app_blocks: usize,
        routines: usize,
        internet_blocks: usize,
    },

    /// App block created, or an existing one raised
    AppBlockRequested {
        block_id: BlockId,
        name: AppName,
        end_time: DateTime<Local>,
        extended: bool,
    },

    /// Internet block created, or the active one raised
    InternetBlockRequested {
        block_id: BlockId,
        end_time: DateTime<Local>,
        extended: bool,
    },

    InternetBlockExtended {
        block_id: BlockId,
        added: Duration,
        end_time: DateTime<Local>,
    },

    RoutineAdded {
        routine_id: BlockId,
        apps: Vec<AppName>,
        start: String,
        end: String,
        days: Vec<String>,
    },

    RoutineRemoved {
        routine_id: BlockId,
    },

    UnblockRequested {
        target: UnblockTarget,
        deadline: DateTime<Local>,
    },

    UnblockCancelled {
        target: UnblockTarget,
    },

    /// Blocks were removed after the cooling period
    UnblockCommitted {
        target: UnblockTarget,
        removed: usize,
    },

    CoolingPeriodChanged {
        minutes: u64,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID (set by the store)
    pub id: i64,

    pub timestamp: DateTime<Local>,

    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, detox_util::now())
    }

    /// Event stamped with an explicit time
    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0,
            timestamp,
            event,
        }
    }
}
