//! Window evaluation: what must be blocked right now, and what is coming up

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate};
use detox_api::{BlockedAppView, UpcomingRoutineView};
use detox_util::{AppName, BlockId};
use std::collections::{BTreeMap, BTreeSet};

use crate::{Registry, RoutineBlock};

/// How far ahead upcoming routine instances are projected
pub const UPCOMING_HORIZON_DAYS: u64 = 7;

/// Enforcement deadline for one app and the blocks behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredApp {
    pub until: DateTime<Local>,
    pub manual: bool,
    pub routine_ids: Vec<BlockId>,
}

/// Every app that must be blocked at `now`, keyed by name.
///
/// The deadline is the latest end across all blocks covering the name.
pub fn desired_apps(registry: &Registry, now: DateTime<Local>) -> BTreeMap<AppName, DesiredApp> {
    let mut desired: BTreeMap<AppName, DesiredApp> = BTreeMap::new();

    for block in registry.active_app_blocks(now) {
        let entry = desired.entry(block.name.clone()).or_insert(DesiredApp {
            until: block.end_time,
            manual: true,
            routine_ids: Vec::new(),
        });
        entry.until = entry.until.max(block.end_time);
        entry.manual = true;
    }

    for routine in registry.active_routines(now) {
        // Contained but unresolvable only across a DST edge; hold a minute
        let until = routine
            .window
            .active_instance_end(&now)
            .unwrap_or(now + ChronoDuration::minutes(1));

        for app in &routine.apps {
            let entry = desired.entry(app.clone()).or_insert(DesiredApp {
                until,
                manual: false,
                routine_ids: Vec::new(),
            });
            entry.until = entry.until.max(until);
            entry.routine_ids.push(routine.id);
        }
    }

    desired
}

/// Names that must be blocked at `now`
pub fn desired_blocked_apps(registry: &Registry, now: DateTime<Local>) -> BTreeSet<AppName> {
    desired_apps(registry, now).into_keys().collect()
}

/// Desired names keyed to their enforcement deadline
pub fn desired_app_deadlines(
    registry: &Registry,
    now: DateTime<Local>,
) -> BTreeMap<AppName, DateTime<Local>> {
    desired_apps(registry, now)
        .into_iter()
        .map(|(name, app)| (name, app.until))
        .collect()
}

/// Whether the internet must be blocked at `now`
pub fn desired_internet_blocked(registry: &Registry, now: DateTime<Local>) -> bool {
    registry.active_internet_block(now).is_some()
}

/// Display form of the desired app set
pub fn blocked_app_views(registry: &Registry, now: DateTime<Local>) -> Vec<BlockedAppView> {
    desired_apps(registry, now)
        .into_iter()
        .map(|(name, app)| BlockedAppView {
            name,
            until: app.until,
            remaining: (app.until - now).to_std().unwrap_or_default(),
            manual: app.manual,
            routine_ids: app.routine_ids,
        })
        .collect()
}

/// One projected routine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingInstance<'a> {
    pub routine: &'a RoutineBlock,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl UpcomingInstance<'_> {
    pub fn view(&self) -> UpcomingRoutineView {
        UpcomingRoutineView {
            routine_id: self.routine.id,
            apps: self.routine.apps.clone(),
            start: self.start,
            end: self.end,
            days: self.routine.days(),
        }
    }
}

/// Routine instances starting after a given instant, in start order
#[derive(Debug, Clone)]
pub struct UpcomingSchedule<'a> {
    routines: &'a [RoutineBlock],
    after: DateTime<Local>,
}

/// Upcoming routine instances within the next week.
///
/// Lazy; nothing is computed until the schedule is iterated.
pub fn upcoming_routines(registry: &Registry, now: DateTime<Local>) -> UpcomingSchedule<'_> {
    UpcomingSchedule {
        routines: registry.routines(),
        after: now,
    }
}

impl<'a> UpcomingSchedule<'a> {
    pub fn iter(&self) -> UpcomingIter<'a> {
        let horizon = self.after + ChronoDuration::days(UPCOMING_HORIZON_DAYS as i64);
        UpcomingIter {
            routines: self.routines,
            after: self.after,
            horizon,
            next_date: Some(self.after.date_naive()),
            buffered: Vec::new(),
        }
    }

    pub fn views(&self) -> Vec<UpcomingRoutineView> {
        self.iter().map(|i| i.view()).collect()
    }
}

impl<'a> IntoIterator for &UpcomingSchedule<'a> {
    type Item = UpcomingInstance<'a>;
    type IntoIter = UpcomingIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over [`UpcomingSchedule`], one calendar day at a time
#[derive(Debug, Clone)]
pub struct UpcomingIter<'a> {
    routines: &'a [RoutineBlock],
    after: DateTime<Local>,
    horizon: DateTime<Local>,
    next_date: Option<NaiveDate>,
    /// Instances for the current day, reversed so `pop` yields the earliest
    buffered: Vec<UpcomingInstance<'a>>,
}

impl<'a> UpcomingIter<'a> {
    fn fill_day(&mut self, date: NaiveDate) {
        let mut day: Vec<UpcomingInstance<'a>> = self
            .routines
            .iter()
            .filter_map(|routine| {
                let (start, end) = routine.window.instance_on(date)?;
                (start > self.after && start <= self.horizon).then_some(UpcomingInstance {
                    routine,
                    start,
                    end,
                })
            })
            .collect();
        day.sort_by_key(|i| std::cmp::Reverse(i.start));
        self.buffered = day;
    }
}

impl<'a> Iterator for UpcomingIter<'a> {
    type Item = UpcomingInstance<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(instance) = self.buffered.pop() {
                return Some(instance);
            }

            let date = self.next_date?;
            if date > self.horizon.date_naive() {
                self.next_date = None;
                return None;
            }
            self.next_date = date.succ_opt();
            self.fill_day(date);
        }
    }
}
