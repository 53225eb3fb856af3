//! Block engine: the single writer of the registry

use chrono::{DateTime, Local};
use detox_api::{
    API_VERSION, AppBlockView, InternetBlockView, RoutineRequest, RoutineView, StateSnapshot,
    UnblockOutcome, UnblockTarget,
};
use detox_store::{AuditEvent, AuditEventType, AuditLog, RegistrySnapshot};
use detox_util::{AppName, BlockId, DaysOfWeek, TimeWindow, WallClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    CoreEvent, CoreResult, GateDecision, MAX_BLOCK_DURATION, Registry, Release, RoutineBlock,
    UnblockGate, ValidationError, blocked_app_views, upcoming_routines, validate_block_duration,
};

/// Registry plus unblock gate, driven by explicit `now` values.
///
/// Every operation validates first and mutates only on success. Events and
/// releases produced along the way are queued for the owner to drain.
pub struct BlockEngine {
    registry: Registry,
    gate: UnblockGate,
    audit: Arc<dyn AuditLog>,
    pending_releases: Vec<Release>,
    outbox: Vec<CoreEvent>,
}

impl BlockEngine {
    pub fn new(registry: Registry, audit: Arc<dyn AuditLog>) -> Self {
        info!(
            app_blocks = registry.app_blocks().len(),
            routines = registry.routines().len(),
            internet_blocks = registry.internet_blocks().len(),
            cooling_minutes = registry.cooling_period().as_secs() / 60,
            "Block engine initialized"
        );

        Self {
            registry,
            gate: UnblockGate::new(),
            audit,
            pending_releases: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn audit(&self, event: AuditEventType, now: DateTime<Local>) {
        let _ = self.audit.append_audit(AuditEvent::at(event, now));
    }

    fn emit(&mut self, event: CoreEvent) {
        self.outbox.push(event);
    }

    /// Block `name` for `duration` from `now`
    pub fn request_app_block(
        &mut self,
        name: &str,
        duration: Duration,
        now: DateTime<Local>,
    ) -> CoreResult<AppBlockView> {
        let name = AppName::new(name);
        if name.is_empty() {
            return Err(ValidationError::EmptyAppName.into());
        }
        let duration = validate_block_duration(duration)?;

        let (block, extended) = self.registry.block_app(name, duration, now);

        self.audit(
            AuditEventType::AppBlockRequested {
                block_id: block.id,
                name: block.name.clone(),
                end_time: block.end_time,
                extended,
            },
            now,
        );
        info!(app = %block.name, until = %block.end_time, extended, "App block requested");

        self.emit(CoreEvent::AppBlocked {
            name: block.name.clone(),
            until: block.end_time,
        });
        Ok(block.view())
    }

    /// Block the internet for `duration` from `now`
    pub fn request_internet_block(
        &mut self,
        duration: Duration,
        now: DateTime<Local>,
    ) -> CoreResult<InternetBlockView> {
        let duration = validate_block_duration(duration)?;
        let (block, extended) = self.registry.block_internet(duration, now);

        self.audit(
            AuditEventType::InternetBlockRequested {
                block_id: block.id,
                end_time: block.end_time,
                extended,
            },
            now,
        );
        info!(until = %block.end_time, extended, "Internet block requested");

        self.emit(CoreEvent::InternetBlocked {
            until: block.end_time,
        });
        Ok(block.view())
    }

    /// Push the active internet block out by `duration`, or start one
    pub fn extend_internet_block(
        &mut self,
        duration: Duration,
        now: DateTime<Local>,
    ) -> CoreResult<InternetBlockView> {
        let duration = validate_block_duration(duration)?;
        let (block, extended) = self.registry.extend_internet(duration, now);

        let event = if extended {
            AuditEventType::InternetBlockExtended {
                block_id: block.id,
                added: duration,
                end_time: block.end_time,
            }
        } else {
            AuditEventType::InternetBlockRequested {
                block_id: block.id,
                end_time: block.end_time,
                extended: false,
            }
        };
        self.audit(event, now);
        info!(until = %block.end_time, extended, "Internet block extended");

        self.emit(CoreEvent::InternetBlocked {
            until: block.end_time,
        });
        Ok(block.view())
    }

    /// Add a weekly routine
    pub fn request_routine_block(
        &mut self,
        request: &RoutineRequest,
        now: DateTime<Local>,
    ) -> CoreResult<RoutineView> {
        let apps: Vec<AppName> = request
            .apps
            .iter()
            .map(AppName::new)
            .filter(|a| !a.is_empty())
            .collect();
        if apps.is_empty() {
            return Err(ValidationError::NoApps.into());
        }

        let start = WallClock::parse(&request.start).map_err(ValidationError::InvalidTime)?;
        let end = WallClock::parse(&request.end).map_err(ValidationError::InvalidTime)?;
        let days = DaysOfWeek::parse_list(request.days.as_slice())
            .map_err(ValidationError::InvalidDay)?;
        if days.is_empty() {
            return Err(ValidationError::NoDays.into());
        }

        let routine = RoutineBlock::new(apps, TimeWindow::new(days, start, end));
        let view = routine.view(now);

        self.audit(
            AuditEventType::RoutineAdded {
                routine_id: routine.id,
                apps: routine.apps.clone(),
                start: start.to_string(),
                end: end.to_string(),
                days: days.names().into_iter().map(String::from).collect(),
            },
            now,
        );
        info!(
            routine_id = %routine.id,
            apps = routine.apps.len(),
            %start,
            %end,
            overnight = routine.window.wraps_midnight(),
            "Routine added"
        );

        self.emit(CoreEvent::RoutineAdded {
            routine_id: routine.id,
        });
        self.registry.add_routine(routine);
        Ok(view)
    }

    /// Delete a routine
    pub fn remove_routine_block(
        &mut self,
        routine_id: BlockId,
        now: DateTime<Local>,
    ) -> CoreResult<RoutineView> {
        let routine = self
            .registry
            .remove_routine(&routine_id)
            .ok_or(ValidationError::UnknownRoutine(routine_id))?;

        self.audit(AuditEventType::RoutineRemoved { routine_id }, now);
        info!(%routine_id, "Routine removed");

        self.emit(CoreEvent::RoutineRemoved { routine_id });
        Ok(routine.view(now))
    }

    fn has_active_block(&self, target: &UnblockTarget, now: DateTime<Local>) -> bool {
        match target {
            UnblockTarget::App { name } => self.registry.active_app_block(name, now).is_some(),
            UnblockTarget::Internet => self.registry.active_internet_block(now).is_some(),
        }
    }

    /// Ask to lift a block early; the cooling period must pass first
    pub fn request_unblock(
        &mut self,
        target: UnblockTarget,
        now: DateTime<Local>,
    ) -> CoreResult<UnblockOutcome> {
        let has_active = self.has_active_block(&target, now);
        let cooling_period = self.registry.cooling_period();

        let outcome = match self
            .gate
            .request(target.clone(), now, cooling_period, has_active)
        {
            GateDecision::NoActiveBlock => {
                debug!(%target, "Unblock requested with nothing to unblock");
                UnblockOutcome::NoActiveBlock { target }
            }
            GateDecision::Existing(countdown) => {
                debug!(%target, remaining = ?countdown.remaining, "Unblock already cooling down");
                UnblockOutcome::AlreadyCoolingDown { countdown }
            }
            GateDecision::Started(countdown) => {
                self.audit(
                    AuditEventType::UnblockRequested {
                        target: target.clone(),
                        deadline: countdown.deadline,
                    },
                    now,
                );
                info!(%target, deadline = %countdown.deadline, "Unblock countdown started");
                self.emit(CoreEvent::UnblockCountdownStarted {
                    countdown: countdown.clone(),
                });
                UnblockOutcome::CoolingDown { countdown }
            }
            GateDecision::CommitNow => {
                self.commit(target.clone(), now);
                UnblockOutcome::Committed { target }
            }
        };

        Ok(outcome)
    }

    /// Cancel one countdown, or all of them when `target` is `None`
    pub fn cancel_unblock(
        &mut self,
        target: Option<&UnblockTarget>,
        now: DateTime<Local>,
    ) -> Vec<UnblockTarget> {
        let cancelled = self.gate.cancel(target);
        for target in &cancelled {
            self.audit(
                AuditEventType::UnblockCancelled {
                    target: target.clone(),
                },
                now,
            );
            info!(%target, "Unblock cancelled");
            self.emit(CoreEvent::UnblockCancelled {
                target: target.clone(),
            });
        }
        cancelled
    }

    /// Change the cooling period; running countdowns keep their deadline
    pub fn set_cooling_period(
        &mut self,
        cooling_period: Duration,
        now: DateTime<Local>,
    ) -> CoreResult<Duration> {
        if cooling_period > MAX_BLOCK_DURATION {
            return Err(ValidationError::CoolingPeriodTooLong(cooling_period).into());
        }

        self.registry.set_cooling_period(cooling_period);
        self.audit(
            AuditEventType::CoolingPeriodChanged {
                minutes: cooling_period.as_secs().div_ceil(60),
            },
            now,
        );
        info!(seconds = cooling_period.as_secs(), "Cooling period changed");

        self.emit(CoreEvent::CoolingPeriodChanged { cooling_period });
        Ok(cooling_period)
    }

    /// Commit countdowns whose deadline has passed.
    ///
    /// Countdowns whose block already ended on its own are dropped.
    pub fn tick(&mut self, now: DateTime<Local>) {
        let stale: Vec<UnblockTarget> = self
            .gate
            .targets()
            .filter(|t| !self.has_active_block(t, now))
            .cloned()
            .collect();
        for target in stale {
            debug!(%target, "Block ended during countdown");
            self.gate.forget(&target);
        }

        for target in self.gate.due(now) {
            self.commit(target, now);
        }
    }

    fn commit(&mut self, target: UnblockTarget, now: DateTime<Local>) {
        let removed = match &target {
            UnblockTarget::App { name } => {
                let removed = self.registry.remove_app_blocks(name);
                self.pending_releases.push(Release::App(name.clone()));
                removed
            }
            UnblockTarget::Internet => {
                let removed = self.registry.remove_future_internet_blocks(now);
                self.pending_releases.push(Release::Internet);
                removed
            }
        };

        self.audit(
            AuditEventType::UnblockCommitted {
                target: target.clone(),
                removed,
            },
            now,
        );
        info!(%target, removed, "Unblock committed");

        self.emit(CoreEvent::UnblockCommitted { target });
    }

    /// Display view of the whole state at `now`
    pub fn snapshot(&mut self, now: DateTime<Local>) -> StateSnapshot {
        let registry = &self.registry;
        StateSnapshot {
            api_version: API_VERSION,
            now,
            cooling_period: registry.cooling_period(),
            blocked_apps: blocked_app_views(registry, now),
            app_blocks: registry.active_app_blocks(now).map(|b| b.view()).collect(),
            internet: registry.active_internet_block(now).map(|b| b.view()),
            routines: registry.routines().iter().map(|r| r.view(now)).collect(),
            upcoming: upcoming_routines(registry, now).views(),
            countdowns: self.gate.views(now),
        }
    }

    /// Compacted persistence form
    pub fn persistable(&self, now: DateTime<Local>) -> RegistrySnapshot {
        self.registry.to_snapshot(now)
    }

    pub fn has_pending_releases(&self) -> bool {
        !self.pending_releases.is_empty()
    }

    pub fn take_releases(&mut self) -> Vec<Release> {
        std::mem::take(&mut self.pending_releases)
    }

    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoreError, desired_blocked_apps, desired_internet_blocked};
    use chrono::TimeZone;
    use detox_store::SqliteAuditLog;

    fn t0() -> DateTime<Local> {
        // Monday
        Local.with_ymd_and_hms(2025, 12, 29, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Local> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn engine() -> (BlockEngine, Arc<SqliteAuditLog>) {
        let audit = Arc::new(SqliteAuditLog::in_memory().unwrap());
        (BlockEngine::new(Registry::default(), audit.clone()), audit)
    }

    fn routine(apps: &[&str], start: &str, end: &str, days: &[&str]) -> RoutineRequest {
        RoutineRequest {
            apps: apps.iter().map(|s| s.to_string()).collect(),
            start: start.into(),
            end: end.into(),
            days: days.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn app_block_end_to_end_membership() {
        let (mut engine, audit) = engine();
        engine.request_app_block("game.exe", mins(1), t0()).unwrap();

        let game = AppName::new("game.exe");
        assert!(desired_blocked_apps(engine.registry(), at(59)).contains(&game));
        assert!(!desired_blocked_apps(engine.registry(), at(60)).contains(&game));

        let events = audit.get_recent_audits(10).unwrap();
        assert!(matches!(
            events[0].event,
            AuditEventType::AppBlockRequested { extended: false, .. }
        ));
        assert_eq!(
            engine.drain_events(),
            vec![CoreEvent::AppBlocked {
                name: game,
                until: at(60)
            }]
        );
    }

    #[test]
    fn invalid_requests_leave_registry_untouched() {
        let (mut engine, _) = engine();

        assert!(matches!(
            engine.request_app_block("  ", mins(5), t0()),
            Err(CoreError::Validation(ValidationError::EmptyAppName))
        ));
        assert!(matches!(
            engine.request_app_block("game.exe", Duration::ZERO, t0()),
            Err(CoreError::Validation(ValidationError::DurationOutOfRange(_)))
        ));
        assert!(engine.request_internet_block(mins(24 * 60 + 1), t0()).is_err());
        assert!(matches!(
            engine.request_routine_block(&routine(&["a"], "25:00", "17:00", &["monday"]), t0()),
            Err(CoreError::Validation(ValidationError::InvalidTime(_)))
        ));
        assert!(matches!(
            engine.request_routine_block(&routine(&["a"], "09:00", "17:00", &[]), t0()),
            Err(CoreError::Validation(ValidationError::NoDays))
        ));
        assert!(matches!(
            engine.request_routine_block(&routine(&["a"], "09:00", "17:00", &["funday"]), t0()),
            Err(CoreError::Validation(ValidationError::InvalidDay(_)))
        ));
        assert!(matches!(
            engine.request_routine_block(&routine(&[" "], "09:00", "17:00", &["monday"]), t0()),
            Err(CoreError::Validation(ValidationError::NoApps))
        ));
        assert!(engine.set_cooling_period(mins(24 * 60 + 1), t0()).is_err());

        assert_eq!(engine.registry(), &Registry::default());
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn routine_add_and_remove() {
        let (mut engine, _) = engine();
        let view = engine
            .request_routine_block(
                &routine(&["game.exe", "chat.exe"], "09:00", "17:00", &["Monday"]),
                t0(),
            )
            .unwrap();
        assert!(view.active);
        assert_eq!(desired_blocked_apps(engine.registry(), t0()).len(), 2);

        engine.remove_routine_block(view.routine_id, t0()).unwrap();
        assert!(desired_blocked_apps(engine.registry(), t0()).is_empty());

        assert!(matches!(
            engine.remove_routine_block(view.routine_id, t0()),
            Err(CoreError::Validation(ValidationError::UnknownRoutine(_)))
        ));
    }

    #[test]
    fn extend_internet_twice_keeps_one_block() {
        let (mut engine, _) = engine();
        engine.request_internet_block(mins(30), t0()).unwrap();
        let block = engine.extend_internet_block(mins(15), at(600)).unwrap();

        assert_eq!(block.end_time, at(45 * 60));
        assert_eq!(engine.registry().internet_blocks().len(), 1);
        assert!(desired_internet_blocked(engine.registry(), at(44 * 60)));
    }

    #[test]
    fn unblock_without_block_is_informational() {
        let (mut engine, _) = engine();
        let outcome = engine
            .request_unblock(UnblockTarget::app("game.exe"), t0())
            .unwrap();
        assert_eq!(
            outcome,
            UnblockOutcome::NoActiveBlock {
                target: UnblockTarget::app("game.exe")
            }
        );
        assert!(engine.snapshot(t0()).countdowns.is_empty());
    }

    #[test]
    fn unblock_commits_after_full_cooling_period() {
        let (mut engine, audit) = engine();
        engine.request_app_block("game.exe", mins(60), t0()).unwrap();
        let target = UnblockTarget::app("game.exe");

        let outcome = engine.request_unblock(target.clone(), t0()).unwrap();
        let countdown = outcome.countdown().unwrap().clone();
        assert_eq!(countdown.remaining, mins(15));

        // Re-requesting does not restart the countdown
        let again = engine.request_unblock(target.clone(), at(120)).unwrap();
        assert!(matches!(again, UnblockOutcome::AlreadyCoolingDown { .. }));
        assert_eq!(again.countdown().unwrap().deadline, countdown.deadline);

        engine.tick(at(15 * 60 - 1));
        let game = AppName::new("game.exe");
        assert!(engine.registry().active_app_block(&game, at(15 * 60 - 1)).is_some());
        assert!(!engine.has_pending_releases());

        engine.tick(at(15 * 60));
        assert!(engine.registry().app_blocks().is_empty());
        assert_eq!(
            engine.take_releases(),
            vec![Release::App(AppName::new("game.exe"))]
        );
        assert!(matches!(
            audit.get_recent_audits(1).unwrap()[0].event,
            AuditEventType::UnblockCommitted { removed: 1, .. }
        ));
    }

    #[test]
    fn cancel_then_rerequest_gets_fresh_countdown() {
        let (mut engine, _) = engine();
        engine.request_internet_block(mins(120), t0()).unwrap();

        engine.request_unblock(UnblockTarget::Internet, t0()).unwrap();
        assert_eq!(
            engine.cancel_unblock(None, at(300)),
            vec![UnblockTarget::Internet]
        );

        // No commit at the old deadline
        engine.tick(at(15 * 60));
        assert!(desired_internet_blocked(engine.registry(), at(15 * 60)));

        let outcome = engine.request_unblock(UnblockTarget::Internet, at(600)).unwrap();
        let countdown = outcome.countdown().unwrap();
        assert_eq!(countdown.started_at, at(600));
        assert_eq!(countdown.remaining, mins(15));
    }

    #[test]
    fn zero_cooling_internet_unblock_commits_immediately() {
        let (mut engine, _) = engine();
        engine.set_cooling_period(Duration::ZERO, t0()).unwrap();
        engine.request_internet_block(mins(30), t0()).unwrap();

        let outcome = engine.request_unblock(UnblockTarget::Internet, at(60)).unwrap();
        assert_eq!(
            outcome,
            UnblockOutcome::Committed {
                target: UnblockTarget::Internet
            }
        );
        assert!(!desired_internet_blocked(engine.registry(), at(60)));
        assert_eq!(engine.take_releases(), vec![Release::Internet]);
        assert!(engine.take_releases().is_empty());
    }

    #[test]
    fn cooling_change_does_not_move_running_deadline() {
        let (mut engine, _) = engine();
        engine.request_app_block("game.exe", mins(60), t0()).unwrap();
        engine
            .request_unblock(UnblockTarget::app("game.exe"), t0())
            .unwrap();

        engine.set_cooling_period(mins(1), at(10)).unwrap();
        engine.tick(at(120));
        assert!(!engine.has_pending_releases());

        let snapshot = engine.snapshot(at(120));
        assert_eq!(snapshot.countdowns[0].deadline, at(15 * 60));
        assert_eq!(snapshot.cooling_period, mins(1));
    }

    #[test]
    fn countdown_dropped_when_block_ends_first() {
        let (mut engine, _) = engine();
        engine.request_app_block("game.exe", mins(5), t0()).unwrap();
        engine
            .request_unblock(UnblockTarget::app("game.exe"), t0())
            .unwrap();

        engine.tick(at(5 * 60));
        assert!(engine.snapshot(at(5 * 60)).countdowns.is_empty());
        assert!(!engine.has_pending_releases());
    }

    #[test]
    fn snapshot_reports_blocks_and_upcoming() {
        let (mut engine, _) = engine();
        engine.request_app_block("game.exe", mins(30), t0()).unwrap();
        engine.request_internet_block(mins(10), t0()).unwrap();
        engine
            .request_routine_block(&routine(&["chat.exe"], "20:00", "22:00", &["weekdays"]), t0())
            .unwrap();

        let snapshot = engine.snapshot(t0());
        assert_eq!(snapshot.api_version, API_VERSION);
        assert_eq!(snapshot.blocked_apps.len(), 1);
        assert_eq!(snapshot.app_blocks.len(), 1);
        assert!(snapshot.internet_blocked());
        assert_eq!(snapshot.routines.len(), 1);
        assert!(!snapshot.routines[0].active);
        assert!(!snapshot.upcoming.is_empty());

        let persisted = engine.persistable(t0());
        assert_eq!(persisted.blocked_apps.len(), 1);
        assert_eq!(persisted.routine_blocks.len(), 1);
    }
}
