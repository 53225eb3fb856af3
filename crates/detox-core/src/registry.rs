//! In-memory block registry

use chrono::{DateTime, Local};
use detox_api::{AppBlockView, InternetBlockView, RoutineView};
use detox_store::{AppBlockRecord, InternetBlockRecord, RegistrySnapshot, RoutineBlockRecord};
use detox_util::{AppName, BlockId, DaysOfWeek, TimeWindow, WallClock};
use std::time::Duration;
use tracing::warn;

use crate::MAX_BLOCK_DURATION;

/// Cooling period of a fresh registry
pub const DEFAULT_COOLING_PERIOD: Duration = Duration::from_secs(15 * 60);

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(1))
}

/// Manual block on one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBlock {
    pub id: BlockId,
    pub name: AppName,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

impl AppBlock {
    pub fn is_active(&self, now: DateTime<Local>) -> bool {
        self.end_time > now
    }

    pub fn view(&self) -> AppBlockView {
        AppBlockView {
            block_id: self.id,
            name: self.name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Recurring weekly block on a set of applications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineBlock {
    pub id: BlockId,
    /// Sorted, without duplicates
    pub apps: Vec<AppName>,
    pub window: TimeWindow,
}

impl RoutineBlock {
    pub fn new(apps: impl IntoIterator<Item = AppName>, window: TimeWindow) -> Self {
        let mut apps: Vec<AppName> = apps.into_iter().filter(|a| !a.is_empty()).collect();
        apps.sort();
        apps.dedup();
        Self {
            id: BlockId::new(),
            apps,
            window,
        }
    }

    pub fn start(&self) -> WallClock {
        self.window.start
    }

    pub fn end(&self) -> WallClock {
        self.window.end
    }

    pub fn days(&self) -> DaysOfWeek {
        self.window.days
    }

    pub fn is_active(&self, now: DateTime<Local>) -> bool {
        self.window.contains(&now)
    }

    pub fn view(&self, now: DateTime<Local>) -> RoutineView {
        RoutineView {
            routine_id: self.id,
            apps: self.apps.clone(),
            start: self.window.start,
            end: self.window.end,
            days: self.window.days,
            active: self.is_active(now),
        }
    }
}

/// Time-bounded internet block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternetBlock {
    pub id: BlockId,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

impl InternetBlock {
    pub fn is_active(&self, now: DateTime<Local>) -> bool {
        self.end_time > now
    }

    pub fn view(&self) -> InternetBlockView {
        InternetBlockView {
            block_id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Every block entity plus the cooling period.
///
/// End times only ever move forward; blocks leave the registry through an
/// unblock commit, routine removal, or compaction of expired entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    app_blocks: Vec<AppBlock>,
    routines: Vec<RoutineBlock>,
    internet_blocks: Vec<InternetBlock>,
    cooling_period: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_COOLING_PERIOD)
    }
}

impl Registry {
    pub fn new(cooling_period: Duration) -> Self {
        Self {
            app_blocks: Vec::new(),
            routines: Vec::new(),
            internet_blocks: Vec::new(),
            cooling_period,
        }
    }

    pub fn app_blocks(&self) -> &[AppBlock] {
        &self.app_blocks
    }

    pub fn routines(&self) -> &[RoutineBlock] {
        &self.routines
    }

    pub fn internet_blocks(&self) -> &[InternetBlock] {
        &self.internet_blocks
    }

    pub fn cooling_period(&self) -> Duration {
        self.cooling_period
    }

    pub fn set_cooling_period(&mut self, cooling_period: Duration) {
        self.cooling_period = cooling_period;
    }

    /// The active block for `name` with the latest end
    pub fn active_app_block(&self, name: &AppName, now: DateTime<Local>) -> Option<&AppBlock> {
        self.app_blocks
            .iter()
            .filter(|b| &b.name == name && b.is_active(now))
            .max_by_key(|b| b.end_time)
    }

    pub fn active_app_blocks(&self, now: DateTime<Local>) -> impl Iterator<Item = &AppBlock> {
        self.app_blocks.iter().filter(move |b| b.is_active(now))
    }

    /// The active internet block with the latest end
    pub fn active_internet_block(&self, now: DateTime<Local>) -> Option<&InternetBlock> {
        self.internet_blocks
            .iter()
            .filter(|b| b.is_active(now))
            .max_by_key(|b| b.end_time)
    }

    pub fn active_routines(&self, now: DateTime<Local>) -> impl Iterator<Item = &RoutineBlock> {
        self.routines.iter().filter(move |r| r.is_active(now))
    }

    pub fn routine(&self, id: &BlockId) -> Option<&RoutineBlock> {
        self.routines.iter().find(|r| &r.id == id)
    }

    /// Block `name` until at least `now + duration`.
    ///
    /// An active block for the same name is raised to `max(end, now +
    /// duration)` instead of adding a second entry. Returns the block and
    /// whether an existing one was reused.
    pub fn block_app(
        &mut self,
        name: AppName,
        duration: Duration,
        now: DateTime<Local>,
    ) -> (AppBlock, bool) {
        let end = now + to_chrono(duration);

        let existing = self
            .app_blocks
            .iter_mut()
            .filter(|b| b.name == name && b.is_active(now))
            .max_by_key(|b| b.end_time);

        if let Some(block) = existing {
            block.end_time = block.end_time.max(end);
            return (block.clone(), true);
        }

        let block = AppBlock {
            id: BlockId::new(),
            name,
            start_time: now,
            end_time: end,
        };
        self.app_blocks.push(block.clone());
        (block, false)
    }

    /// Block the internet until at least `now + duration`.
    ///
    /// Raises the active block rather than adding a concurrent one.
    pub fn block_internet(
        &mut self,
        duration: Duration,
        now: DateTime<Local>,
    ) -> (InternetBlock, bool) {
        let end = now + to_chrono(duration);

        if let Some(block) = self.active_internet_block_mut(now) {
            block.end_time = block.end_time.max(end);
            return (block.clone(), true);
        }

        (self.push_internet_block(end, now), false)
    }

    /// Add `duration` to the active internet block, or start one lasting
    /// `duration` when none is active. Returns the block and whether an
    /// existing one was extended.
    pub fn extend_internet(
        &mut self,
        duration: Duration,
        now: DateTime<Local>,
    ) -> (InternetBlock, bool) {
        if let Some(block) = self.active_internet_block_mut(now) {
            block.end_time += to_chrono(duration);
            return (block.clone(), true);
        }

        (self.push_internet_block(now + to_chrono(duration), now), false)
    }

    fn active_internet_block_mut(&mut self, now: DateTime<Local>) -> Option<&mut InternetBlock> {
        self.internet_blocks
            .iter_mut()
            .filter(|b| b.is_active(now))
            .max_by_key(|b| b.end_time)
    }

    fn push_internet_block(&mut self, end: DateTime<Local>, now: DateTime<Local>) -> InternetBlock {
        let block = InternetBlock {
            id: BlockId::new(),
            start_time: now,
            end_time: end,
        };
        self.internet_blocks.push(block.clone());
        block
    }

    pub fn add_routine(&mut self, routine: RoutineBlock) {
        self.routines.push(routine);
    }

    pub fn remove_routine(&mut self, id: &BlockId) -> Option<RoutineBlock> {
        let index = self.routines.iter().position(|r| &r.id == id)?;
        Some(self.routines.remove(index))
    }

    /// Remove every app block for `name`; returns how many were removed
    pub fn remove_app_blocks(&mut self, name: &AppName) -> usize {
        let before = self.app_blocks.len();
        self.app_blocks.retain(|b| &b.name != name);
        before - self.app_blocks.len()
    }

    /// Remove internet blocks that end after `now`; returns how many were removed
    pub fn remove_future_internet_blocks(&mut self, now: DateTime<Local>) -> usize {
        let before = self.internet_blocks.len();
        self.internet_blocks.retain(|b| b.end_time <= now);
        before - self.internet_blocks.len()
    }

    /// Rebuild from a persisted snapshot
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut cooling_period =
            Duration::from_secs(snapshot.cooling_period_minutes.saturating_mul(60));
        if cooling_period > MAX_BLOCK_DURATION {
            warn!(
                minutes = snapshot.cooling_period_minutes,
                "Stored cooling period too long, clamping to 24 hours"
            );
            cooling_period = MAX_BLOCK_DURATION;
        }

        let app_blocks = snapshot
            .blocked_apps
            .into_iter()
            .filter(|r| !r.name.is_empty())
            .map(|r| AppBlock {
                id: r.id,
                name: r.name,
                start_time: r.start_time,
                end_time: r.end_time,
            })
            .collect();

        let routines = snapshot
            .routine_blocks
            .into_iter()
            .filter_map(|r| {
                if r.days.is_empty() {
                    warn!(routine_id = %r.id, "Dropping stored routine without days");
                    return None;
                }
                let mut routine =
                    RoutineBlock::new(r.apps, TimeWindow::new(r.days, r.start_time, r.end_time));
                routine.id = r.id;
                if routine.apps.is_empty() {
                    warn!(routine_id = %r.id, "Dropping stored routine without apps");
                    return None;
                }
                Some(routine)
            })
            .collect();

        let internet_blocks = snapshot
            .internet_blocks
            .into_iter()
            .map(|r| InternetBlock {
                id: r.id,
                start_time: r.start_time,
                end_time: r.end_time,
            })
            .collect();

        Self {
            app_blocks,
            routines,
            internet_blocks,
            cooling_period,
        }
    }

    /// Persistable form with entries that ended by `now` dropped
    pub fn to_snapshot(&self, now: DateTime<Local>) -> RegistrySnapshot {
        let secs = self.cooling_period.as_secs();
        RegistrySnapshot {
            blocked_apps: self
                .app_blocks
                .iter()
                .map(|b| AppBlockRecord {
                    id: b.id,
                    name: b.name.clone(),
                    start_time: b.start_time,
                    end_time: b.end_time,
                })
                .collect(),
            routine_blocks: self
                .routines
                .iter()
                .map(|r| RoutineBlockRecord {
                    id: r.id,
                    apps: r.apps.clone(),
                    start_time: r.window.start,
                    end_time: r.window.end,
                    days: r.window.days,
                })
                .collect(),
            internet_blocks: self
                .internet_blocks
                .iter()
                .map(|b| InternetBlockRecord {
                    id: b.id,
                    start_time: b.start_time,
                    end_time: b.end_time,
                })
                .collect(),
            // Round up so a reload never shortens the cooling period
            cooling_period_minutes: secs.div_ceil(60),
            ..RegistrySnapshot::default()
        }
        .compact(now)
    }
}
