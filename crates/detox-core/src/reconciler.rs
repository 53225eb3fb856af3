//! Enforcement reconciler
//!
//! Converges the worker table and the network state on what the registry
//! says must be blocked. The reconciler is the only owner of the worker
//! table; the engine reaches it through [`Release`] messages that are
//! drained together with the registry snapshot.

use chrono::{DateTime, Local};
use detox_host_api::{NetworkController, ProcessController};
use detox_util::{AppName, Clock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    CoreError, CoreEvent, EngineHandle, Registry, TargetWorker, WorkerConfig,
    desired_app_deadlines, desired_internet_blocked,
};

/// Reconciler timing and startup behaviour
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    pub tick_interval: Duration,
    pub worker_interval: Duration,
    /// Upper bound on any single collaborator call
    pub call_timeout: Duration,
    /// Enable the network once on the first tick if nothing blocks it
    pub restore_network_on_start: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            worker_interval: Duration::from_secs(1),
            call_timeout: Duration::from_secs(3),
            restore_network_on_start: false,
        }
    }
}

impl ReconcilerConfig {
    fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            interval: self.worker_interval,
            call_timeout: self.call_timeout,
        }
    }
}

/// Enforcement to drop after an unblock commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    App(AppName),
    Internet,
}

/// What the reconciler fetches from the engine each tick
#[derive(Debug, Clone)]
pub struct ReconcileState {
    pub registry: Registry,
    /// Releases queued since the previous fetch
    pub releases: Vec<Release>,
}

/// Internet lane state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternetLane {
    Idle,
    Enforcing,
}

pub struct Reconciler {
    process: Arc<dyn ProcessController>,
    network: Arc<dyn NetworkController>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    events: broadcast::Sender<CoreEvent>,
    workers: HashMap<AppName, TargetWorker>,
    lane: InternetLane,
    first_tick: bool,
    spawned_total: usize,
}

impl Reconciler {
    pub fn new(
        process: Arc<dyn ProcessController>,
        network: Arc<dyn NetworkController>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            process,
            network,
            clock,
            config,
            events,
            workers: HashMap::new(),
            lane: InternetLane::Idle,
            first_tick: true,
            spawned_total: 0,
        }
    }

    pub fn lane(&self) -> InternetLane {
        self.lane
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn has_worker(&self, name: &AppName) -> bool {
        self.workers.contains_key(name)
    }

    /// Workers spawned over the reconciler's lifetime
    pub fn spawned_total(&self) -> usize {
        self.spawned_total
    }

    /// Tick loop; runs until `cancel` fires or the engine goes away
    pub async fn run(mut self, engine: EngineHandle, wake: Arc<Notify>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = wake.notified() => debug!("Reconciler woken for release"),
            }

            match engine.reconcile_state().await {
                Ok(state) => {
                    let now = self.clock.now();
                    self.reconcile(state, now).await;
                }
                Err(CoreError::EngineUnavailable) => {
                    info!("Block engine gone, reconciler exiting");
                    break;
                }
                Err(e) => warn!(error = %e, "Failed to fetch registry state"),
            }
        }

        self.shutdown().await;
    }

    /// One convergence pass against `state` at `now`
    pub async fn reconcile(&mut self, state: ReconcileState, now: DateTime<Local>) {
        let mut internet_released = false;
        for release in state.releases {
            match release {
                Release::App(name) => self.release_app(&name),
                Release::Internet => {
                    self.release_internet().await;
                    internet_released = true;
                }
            }
        }

        self.reconcile_apps(&state.registry, now);

        // A failed release leaves the lane Enforcing; the next tick retries
        if !internet_released {
            let desired = desired_internet_blocked(&state.registry, now);
            self.reconcile_internet(desired).await;
        }

        self.first_tick = false;
    }

    fn reconcile_apps(&mut self, registry: &Registry, now: DateTime<Local>) {
        let deadlines = desired_app_deadlines(registry, now);

        let events = &self.events;
        self.workers.retain(|name, worker| {
            if deadlines.contains_key(name) {
                return true;
            }
            worker.stop();
            info!(app = %name, "App no longer blocked, worker stopped");
            let _ = events.send(CoreEvent::EnforcementStopped { name: name.clone() });
            false
        });

        for (name, until) in deadlines {
            self.terminate_now(name.clone());

            let needs_worker = match self.workers.get(&name) {
                None => true,
                Some(worker) => worker.is_finished() || worker.end() < until,
            };
            if !needs_worker {
                continue;
            }

            if let Some(old) = self.workers.remove(&name) {
                debug!(app = %name, old_end = %old.end(), new_end = %until, "Replacing worker");
                old.stop();
            }

            let worker = TargetWorker::spawn(
                name.clone(),
                until,
                self.process.clone(),
                self.clock.clone(),
                self.config.worker(),
            );
            self.workers.insert(name.clone(), worker);
            self.spawned_total += 1;
            let _ = self
                .events
                .send(CoreEvent::EnforcementStarted { name, until });
        }
    }

    /// Fire-and-forget termination so one slow call only delays its own target
    fn terminate_now(&self, name: AppName) {
        let process = self.process.clone();
        let call_timeout = self.config.call_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(call_timeout, process.terminate(&name)).await {
                Ok(Ok(report)) if report.killed_any() => {
                    info!(app = %name, pids = ?report.killed, "Terminated blocked app");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(app = %name, error = %e, "Termination failed"),
                Err(_) => warn!(app = %name, "Termination timed out"),
            }
        });
    }

    fn release_app(&mut self, name: &AppName) {
        if let Some(worker) = self.workers.remove(name) {
            worker.stop();
            info!(app = %name, "Unblock committed, worker stopped");
            let _ = self
                .events
                .send(CoreEvent::EnforcementStopped { name: name.clone() });
        }
    }

    async fn release_internet(&mut self) {
        if self.set_network(true).await {
            info!("Unblock committed, network enabled");
            self.lane = InternetLane::Idle;
            let _ = self
                .events
                .send(CoreEvent::NetworkEnforcement { blocked: false });
        }
    }

    async fn reconcile_internet(&mut self, desired: bool) {
        match (self.lane, desired) {
            (InternetLane::Idle, true) => {
                if self.set_network(false).await {
                    info!("Internet block active, network disabled");
                    self.lane = InternetLane::Enforcing;
                    let _ = self
                        .events
                        .send(CoreEvent::NetworkEnforcement { blocked: true });
                }
            }
            (InternetLane::Enforcing, false) => {
                if self.set_network(true).await {
                    info!("Internet block ended, network enabled");
                    self.lane = InternetLane::Idle;
                    let _ = self
                        .events
                        .send(CoreEvent::NetworkEnforcement { blocked: false });
                }
            }
            (InternetLane::Idle, false)
                if self.first_tick && self.config.restore_network_on_start =>
            {
                if self.set_network(true).await {
                    info!("Network restored on startup");
                }
            }
            _ => {}
        }
    }

    /// Bounded collaborator call; `true` on success
    async fn set_network(&self, enabled: bool) -> bool {
        let call = self.network.set_network_enabled(enabled);
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(enabled, error = %e, "Network switch failed, retrying next tick");
                false
            }
            Err(_) => {
                warn!(enabled, "Network switch timed out, retrying next tick");
                false
            }
        }
    }

    /// Stop every worker and wait for them to exit
    pub async fn shutdown(&mut self) {
        let workers: Vec<TargetWorker> = self.workers.drain().map(|(_, w)| w).collect();
        let count = workers.len();
        for worker in workers {
            worker.shutdown().await;
        }
        info!(workers = count, "Reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use detox_host_api::{MockNetworkController, MockProcessController};
    use detox_util::ManualClock;

    struct Harness {
        process: Arc<MockProcessController>,
        network: Arc<MockNetworkController>,
        clock: Arc<ManualClock>,
        events: broadcast::Receiver<CoreEvent>,
        reconciler: Reconciler,
    }

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 12, 29, 12, 0, 0).unwrap()
    }

    fn harness(restore_network_on_start: bool) -> Harness {
        let process = Arc::new(MockProcessController::new());
        let network = Arc::new(MockNetworkController::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let (tx, events) = broadcast::channel(64);
        let config = ReconcilerConfig {
            tick_interval: Duration::from_millis(20),
            worker_interval: Duration::from_millis(10),
            call_timeout: Duration::from_millis(200),
            restore_network_on_start,
        };
        let reconciler = Reconciler::new(
            process.clone(),
            network.clone(),
            clock.clone(),
            config,
            tx,
        );
        Harness {
            process,
            network,
            clock,
            events,
            reconciler,
        }
    }

    fn state(registry: &Registry) -> ReconcileState {
        ReconcileState {
            registry: registry.clone(),
            releases: Vec::new(),
        }
    }

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[tokio::test]
    async fn repeated_ticks_do_not_duplicate_workers() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        registry.block_app(AppName::new("game.exe"), mins(10), t0());

        for _ in 0..3 {
            h.reconciler.reconcile(state(&registry), t0()).await;
        }

        assert_eq!(h.reconciler.worker_count(), 1);
        assert_eq!(h.reconciler.spawned_total(), 1);
        assert!(matches!(
            h.events.try_recv(),
            Ok(CoreEvent::EnforcementStarted { .. })
        ));
        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn extended_block_replaces_worker() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        let name = AppName::new("game.exe");
        registry.block_app(name.clone(), mins(10), t0());
        h.reconciler.reconcile(state(&registry), t0()).await;

        registry.block_app(name.clone(), mins(30), t0());
        h.reconciler.reconcile(state(&registry), t0()).await;

        assert_eq!(h.reconciler.worker_count(), 1);
        assert_eq!(h.reconciler.spawned_total(), 2);
        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn immediate_termination_each_tick() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        registry.block_app(AppName::new("game.exe"), mins(10), t0());
        h.process.launch("game.exe");

        h.reconciler.reconcile(state(&registry), t0()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!h.process.is_running("game.exe"));

        // Nothing running: terminate is a quiet no-op
        h.reconciler.reconcile(state(&registry), t0()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(h.process.terminate_count("game.exe") >= 2);
        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn undesired_worker_is_stopped() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        let name = AppName::new("game.exe");
        registry.block_app(name.clone(), mins(10), t0());
        h.reconciler.reconcile(state(&registry), t0()).await;
        assert!(h.reconciler.has_worker(&name));

        let later = t0() + chrono::Duration::minutes(11);
        h.clock.set(later);
        h.reconciler.reconcile(state(&registry), later).await;
        assert!(!h.reconciler.has_worker(&name));
    }

    #[tokio::test]
    async fn internet_lane_transitions_once_each_way() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        registry.block_internet(mins(5), t0());

        h.reconciler.reconcile(state(&registry), t0()).await;
        h.reconciler.reconcile(state(&registry), t0()).await;
        assert_eq!(h.reconciler.lane(), InternetLane::Enforcing);
        assert_eq!(h.network.calls(), vec![false]);

        let later = t0() + chrono::Duration::minutes(5);
        h.reconciler.reconcile(state(&registry), later).await;
        h.reconciler.reconcile(state(&registry), later).await;
        assert_eq!(h.reconciler.lane(), InternetLane::Idle);
        assert_eq!(h.network.calls(), vec![false, true]);
    }

    #[tokio::test]
    async fn network_failure_is_retried_next_tick() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        registry.block_internet(mins(5), t0());
        h.network.set_fail(true);

        h.reconciler.reconcile(state(&registry), t0()).await;
        assert_eq!(h.reconciler.lane(), InternetLane::Idle);

        h.network.set_fail(false);
        h.reconciler.reconcile(state(&registry), t0()).await;
        assert_eq!(h.reconciler.lane(), InternetLane::Enforcing);
        assert_eq!(h.network.disable_calls(), 2);
        assert!(!h.network.is_enabled());
    }

    #[tokio::test]
    async fn internet_release_enables_exactly_once() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        registry.block_internet(mins(30), t0());
        h.reconciler.reconcile(state(&registry), t0()).await;

        registry.remove_future_internet_blocks(t0());
        let released = ReconcileState {
            registry: registry.clone(),
            releases: vec![Release::Internet],
        };
        h.reconciler.reconcile(released, t0()).await;
        h.reconciler.reconcile(state(&registry), t0()).await;

        assert_eq!(h.network.enable_calls(), 1);
        assert_eq!(h.reconciler.lane(), InternetLane::Idle);
        assert!(h.network.is_enabled());
    }

    #[tokio::test]
    async fn app_release_stops_worker() {
        let mut h = harness(false);
        let mut registry = Registry::default();
        let name = AppName::new("game.exe");
        registry.block_app(name.clone(), mins(30), t0());
        h.reconciler.reconcile(state(&registry), t0()).await;

        registry.remove_app_blocks(&name);
        let released = ReconcileState {
            registry,
            releases: vec![Release::App(name.clone())],
        };
        h.reconciler.reconcile(released, t0()).await;
        assert!(!h.reconciler.has_worker(&name));
    }

    #[tokio::test]
    async fn restore_network_on_first_tick_only() {
        let mut h = harness(true);
        let registry = Registry::default();

        h.reconciler.reconcile(state(&registry), t0()).await;
        h.reconciler.reconcile(state(&registry), t0()).await;
        assert_eq!(h.network.calls(), vec![true]);
    }
}
