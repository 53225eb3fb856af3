//! Unblock gate: a cooling-off countdown before a block can be lifted

use chrono::{DateTime, Local};
use detox_api::{CountdownView, UnblockTarget};
use detox_util::ceil_seconds;
use std::collections::BTreeMap;
use std::time::Duration;

/// A running countdown for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub target: UnblockTarget,
    pub started_at: DateTime<Local>,
    pub deadline: DateTime<Local>,
    last_remaining: Duration,
}

impl Countdown {
    fn new(target: UnblockTarget, now: DateTime<Local>, cooling_period: Duration) -> Self {
        let deadline =
            now + chrono::Duration::from_std(cooling_period).unwrap_or(chrono::Duration::zero());
        Self {
            target,
            started_at: now,
            deadline,
            last_remaining: ceil_seconds(cooling_period),
        }
    }

    /// Remaining time in whole seconds, rounded up.
    ///
    /// Never increases between observations, even if the clock steps back.
    pub fn observe(&mut self, now: DateTime<Local>) -> Duration {
        let remaining = ceil_seconds((self.deadline - now).to_std().unwrap_or_default());
        self.last_remaining = self.last_remaining.min(remaining);
        self.last_remaining
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        now >= self.deadline
    }

    pub fn view(&mut self, now: DateTime<Local>) -> CountdownView {
        CountdownView {
            target: self.target.clone(),
            started_at: self.started_at,
            deadline: self.deadline,
            remaining: self.observe(now),
        }
    }
}

/// What the gate did with an unblock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Nothing is blocked for the target
    NoActiveBlock,
    /// A new countdown was started
    Started(CountdownView),
    /// A countdown was already running; returned unchanged
    Existing(CountdownView),
    /// Cooling period is zero; commit right away
    CommitNow,
}

/// At most one countdown per target
#[derive(Debug, Default)]
pub struct UnblockGate {
    countdowns: BTreeMap<UnblockTarget, Countdown>,
}

impl UnblockGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an unblock request.
    ///
    /// Repeated requests never restart a running countdown.
    pub fn request(
        &mut self,
        target: UnblockTarget,
        now: DateTime<Local>,
        cooling_period: Duration,
        has_active_block: bool,
    ) -> GateDecision {
        if let Some(countdown) = self.countdowns.get_mut(&target) {
            return GateDecision::Existing(countdown.view(now));
        }

        if !has_active_block {
            return GateDecision::NoActiveBlock;
        }

        if cooling_period.is_zero() {
            return GateDecision::CommitNow;
        }

        let mut countdown = Countdown::new(target.clone(), now, cooling_period);
        let view = countdown.view(now);
        self.countdowns.insert(target, countdown);
        GateDecision::Started(view)
    }

    /// Cancel the countdown for `target`, or every countdown when `None`.
    ///
    /// Returns the targets whose countdown was dropped.
    pub fn cancel(&mut self, target: Option<&UnblockTarget>) -> Vec<UnblockTarget> {
        match target {
            Some(target) => self
                .countdowns
                .remove(target)
                .map(|c| vec![c.target])
                .unwrap_or_default(),
            None => std::mem::take(&mut self.countdowns).into_keys().collect(),
        }
    }

    /// Remove and return every countdown whose deadline has passed
    pub fn due(&mut self, now: DateTime<Local>) -> Vec<UnblockTarget> {
        let due: Vec<UnblockTarget> = self
            .countdowns
            .values()
            .filter(|c| c.is_due(now))
            .map(|c| c.target.clone())
            .collect();
        for target in &due {
            self.countdowns.remove(target);
        }
        due
    }

    /// Drop a countdown whose target no longer has anything to unblock
    pub fn forget(&mut self, target: &UnblockTarget) -> bool {
        self.countdowns.remove(target).is_some()
    }

    pub fn contains(&self, target: &UnblockTarget) -> bool {
        self.countdowns.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &UnblockTarget> {
        self.countdowns.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.countdowns.is_empty()
    }

    pub fn views(&mut self, now: DateTime<Local>) -> Vec<CountdownView> {
        self.countdowns.values_mut().map(|c| c.view(now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 12, 29, 12, 0, 0).unwrap()
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::seconds(s)
    }

    #[test]
    fn no_active_block_changes_nothing() {
        let mut gate = UnblockGate::new();
        let decision = gate.request(UnblockTarget::Internet, t0(), FIFTEEN_MINUTES, false);
        assert_eq!(decision, GateDecision::NoActiveBlock);
        assert!(gate.is_empty());
    }

    #[test]
    fn zero_cooling_commits_immediately() {
        let mut gate = UnblockGate::new();
        let decision = gate.request(UnblockTarget::Internet, t0(), Duration::ZERO, true);
        assert_eq!(decision, GateDecision::CommitNow);
        assert!(gate.is_empty());
    }

    #[test]
    fn repeated_request_does_not_restart() {
        let mut gate = UnblockGate::new();
        let target = UnblockTarget::app("game.exe");

        let GateDecision::Started(first) =
            gate.request(target.clone(), t0(), FIFTEEN_MINUTES, true)
        else {
            panic!("expected a new countdown");
        };
        assert_eq!(first.remaining, FIFTEEN_MINUTES);

        let later = t0() + secs(60);
        let GateDecision::Existing(second) =
            gate.request(target.clone(), later, FIFTEEN_MINUTES, true)
        else {
            panic!("expected the running countdown");
        };
        assert_eq!(second.deadline, first.deadline);
        assert_eq!(second.remaining, Duration::from_secs(14 * 60));
    }

    #[test]
    fn cancel_then_request_starts_fresh() {
        let mut gate = UnblockGate::new();
        let target = UnblockTarget::app("game.exe");
        gate.request(target.clone(), t0(), FIFTEEN_MINUTES, true);

        let later = t0() + secs(300);
        assert_eq!(gate.cancel(Some(&target)), vec![target.clone()]);
        assert!(gate.cancel(Some(&target)).is_empty());

        let GateDecision::Started(fresh) = gate.request(target, later, FIFTEEN_MINUTES, true)
        else {
            panic!("expected a new countdown");
        };
        assert_eq!(fresh.started_at, later);
        assert_eq!(fresh.remaining, FIFTEEN_MINUTES);
    }

    #[test]
    fn cancel_all() {
        let mut gate = UnblockGate::new();
        gate.request(UnblockTarget::app("a.exe"), t0(), FIFTEEN_MINUTES, true);
        gate.request(UnblockTarget::Internet, t0(), FIFTEEN_MINUTES, true);

        let cancelled = gate.cancel(None);
        assert_eq!(cancelled.len(), 2);
        assert!(gate.is_empty());
    }

    #[test]
    fn due_returns_expired_countdowns_once() {
        let mut gate = UnblockGate::new();
        gate.request(UnblockTarget::Internet, t0(), Duration::from_secs(60), true);
        gate.request(UnblockTarget::app("a.exe"), t0(), FIFTEEN_MINUTES, true);

        assert!(gate.due(t0() + secs(59)).is_empty());
        assert_eq!(gate.due(t0() + secs(60)), vec![UnblockTarget::Internet]);
        assert!(gate.due(t0() + secs(61)).is_empty());
        assert!(gate.contains(&UnblockTarget::app("a.exe")));
    }

    #[test]
    fn remaining_rounds_up_and_never_increases() {
        let mut gate = UnblockGate::new();
        gate.request(UnblockTarget::Internet, t0(), FIFTEEN_MINUTES, true);

        let half_second_in = t0() + chrono::Duration::milliseconds(500);
        assert_eq!(gate.views(half_second_in)[0].remaining, FIFTEEN_MINUTES);

        let later = t0() + secs(10);
        let at_later = gate.views(later)[0].remaining;
        assert_eq!(at_later, FIFTEEN_MINUTES - Duration::from_secs(10));

        // Clock stepped back
        assert_eq!(gate.views(t0())[0].remaining, at_later);
    }
}
