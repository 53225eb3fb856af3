//! On-disk form of the block registry
//!
//! Field names are camelCase (`blockedApps`, `routineBlocks`,
//! `internetBlocks`, `coolingPeriodMinutes`). Instants are RFC 3339 strings
//! with offset, routine times are `HH:MM`, days are full English names.
//! Unknown fields are ignored and missing ones default, so older and newer
//! files both load. The snake_case names of the legacy format are accepted
//! as aliases, and so are its offset-less ISO 8601 instants, which are read
//! as local time.

use chrono::{DateTime, Local, NaiveDateTime};
use detox_util::{AppName, BlockId, DaysOfWeek, WallClock, resolve_local_forward};
use serde::{Deserialize, Deserializer, Serialize};

/// Current snapshot document version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Cooling period assumed when a document does not specify one
pub const DEFAULT_COOLING_PERIOD_MINUTES: u64 = 15;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

fn default_cooling_period_minutes() -> u64 {
    DEFAULT_COOLING_PERIOD_MINUTES
}

/// Full registry snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, alias = "blocked_apps")]
    pub blocked_apps: Vec<AppBlockRecord>,

    #[serde(default, alias = "routine_blocks")]
    pub routine_blocks: Vec<RoutineBlockRecord>,

    #[serde(default, alias = "internet_blocks")]
    pub internet_blocks: Vec<InternetBlockRecord>,

    #[serde(
        default = "default_cooling_period_minutes",
        alias = "cooling_period_minutes"
    )]
    pub cooling_period_minutes: u64,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            blocked_apps: Vec::new(),
            routine_blocks: Vec::new(),
            internet_blocks: Vec::new(),
            cooling_period_minutes: DEFAULT_COOLING_PERIOD_MINUTES,
        }
    }
}

impl RegistrySnapshot {
    /// Drop app and internet blocks that ended at or before `now`.
    ///
    /// Routines never expire and are kept.
    pub fn compact(mut self, now: DateTime<Local>) -> Self {
        self.blocked_apps.retain(|b| b.end_time > now);
        self.internet_blocks.retain(|b| b.end_time > now);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.blocked_apps.is_empty()
            && self.routine_blocks.is_empty()
            && self.internet_blocks.is_empty()
    }
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` taken as local time
fn local_instant<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| serde::de::Error::custom(format!("invalid instant {raw:?}: {e}")))?;
    resolve_local_forward(naive.date(), naive.time())
        .ok_or_else(|| serde::de::Error::custom(format!("nonexistent local time {raw:?}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBlockRecord {
    #[serde(default)]
    pub id: BlockId,
    pub name: AppName,
    #[serde(alias = "start_time", deserialize_with = "local_instant")]
    pub start_time: DateTime<Local>,
    #[serde(alias = "end_time", deserialize_with = "local_instant")]
    pub end_time: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineBlockRecord {
    #[serde(default)]
    pub id: BlockId,
    pub apps: Vec<AppName>,
    #[serde(alias = "start_time")]
    pub start_time: WallClock,
    #[serde(alias = "end_time")]
    pub end_time: WallClock,
    pub days: DaysOfWeek,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetBlockRecord {
    #[serde(default)]
    pub id: BlockId,
    #[serde(alias = "start_time", deserialize_with = "local_instant")]
    pub start_time: DateTime<Local>,
    #[serde(alias = "end_time", deserialize_with = "local_instant")]
    pub end_time: DateTime<Local>,
}
