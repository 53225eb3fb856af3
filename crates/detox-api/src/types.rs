//! Shared types for the detoxd API

use chrono::{DateTime, Local};
use detox_util::{AppName, BlockId, DaysOfWeek, WallClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of block entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    App,
    Routine,
    Internet,
}

/// What an unblock request is aimed at
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnblockTarget {
    App { name: AppName },
    Internet,
}

impl UnblockTarget {
    pub fn app(name: impl Into<AppName>) -> Self {
        UnblockTarget::App { name: name.into() }
    }
}

impl fmt::Display for UnblockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnblockTarget::App { name } => write!(f, "app:{}", name),
            UnblockTarget::Internet => write!(f, "internet"),
        }
    }
}

/// A manual, time-bounded block on one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBlockView {
    pub block_id: BlockId,
    pub name: AppName,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

/// A time-bounded internet block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternetBlockView {
    pub block_id: BlockId,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

/// A recurring routine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineView {
    pub routine_id: BlockId,
    pub apps: Vec<AppName>,
    pub start: WallClock,
    pub end: WallClock,
    pub days: DaysOfWeek,
    /// Whether the routine window holds at the snapshot instant
    pub active: bool,
}

/// An application that is currently being enforced, with why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedAppView {
    pub name: AppName,
    /// Latest end instant across every block covering the name
    pub until: DateTime<Local>,
    pub remaining: Duration,
    /// Covered by a manual app block
    pub manual: bool,
    /// Routines whose window currently covers the name
    #[serde(default)]
    pub routine_ids: Vec<BlockId>,
}

/// One projected routine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingRoutineView {
    pub routine_id: BlockId,
    pub apps: Vec<AppName>,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub days: DaysOfWeek,
}

/// An unblock countdown in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownView {
    pub target: UnblockTarget,
    pub started_at: DateTime<Local>,
    pub deadline: DateTime<Local>,
    /// Whole seconds left, rounded up
    pub remaining: Duration,
}

/// Result of an unblock request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnblockOutcome {
    /// Nothing matching the target is blocked; no state changed
    NoActiveBlock { target: UnblockTarget },
    /// A fresh countdown was started
    CoolingDown { countdown: CountdownView },
    /// A countdown for the target was already running and is unchanged
    AlreadyCoolingDown { countdown: CountdownView },
    /// The block was removed without waiting (cooling period of zero)
    Committed { target: UnblockTarget },
}

impl UnblockOutcome {
    pub fn countdown(&self) -> Option<&CountdownView> {
        match self {
            UnblockOutcome::CoolingDown { countdown }
            | UnblockOutcome::AlreadyCoolingDown { countdown } => Some(countdown),
            _ => None,
        }
    }
}

/// Read-only view of the whole block state for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub api_version: u32,
    pub now: DateTime<Local>,
    pub cooling_period: Duration,
    /// Applications that must be blocked right now
    pub blocked_apps: Vec<BlockedAppView>,
    /// Active manual app blocks
    pub app_blocks: Vec<AppBlockView>,
    /// The active internet block, if any
    pub internet: Option<InternetBlockView>,
    pub routines: Vec<RoutineView>,
    /// Routine instances starting within the next seven days
    #[serde(default)]
    pub upcoming: Vec<UpcomingRoutineView>,
    #[serde(default)]
    pub countdowns: Vec<CountdownView>,
}

impl StateSnapshot {
    pub fn internet_blocked(&self) -> bool {
        self.internet.is_some()
    }

    pub fn countdown_for(&self, target: &UnblockTarget) -> Option<&CountdownView> {
        self.countdowns.iter().find(|c| &c.target == target)
    }
}

/// Raw routine request as typed by a user; parsed and validated by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineRequest {
    pub apps: Vec<String>,
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`; at or before `start` means the window crosses midnight
    pub end: String,
    /// Day names or presets (`weekdays`, `weekends`, `all`)
    pub days: Vec<String>,
}

/// A running process as seen by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessView {
    pub pid: u32,
    pub name: String,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub process_controller_ok: bool,
    pub mock_time: bool,
}
