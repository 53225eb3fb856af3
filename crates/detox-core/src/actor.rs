//! Engine actor
//!
//! One task owns the [`BlockEngine`]. Everything else talks to it through a
//! cloneable [`EngineHandle`]: commands go over an mpsc channel and replies
//! come back on a oneshot. Registry reads are clones.

use detox_api::{
    AppBlockView, InternetBlockView, RoutineRequest, RoutineView, StateSnapshot, UnblockOutcome,
    UnblockTarget,
};
use detox_store::RegistrySnapshot;
use detox_util::{BlockId, Clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{BlockEngine, CoreError, CoreEvent, CoreResult, ReconcileState};

const COMMAND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

enum EngineCommand {
    RequestAppBlock {
        name: String,
        duration: Duration,
        reply: oneshot::Sender<CoreResult<AppBlockView>>,
    },
    RequestInternetBlock {
        duration: Duration,
        reply: oneshot::Sender<CoreResult<InternetBlockView>>,
    },
    ExtendInternetBlock {
        duration: Duration,
        reply: oneshot::Sender<CoreResult<InternetBlockView>>,
    },
    RequestRoutineBlock {
        request: RoutineRequest,
        reply: oneshot::Sender<CoreResult<RoutineView>>,
    },
    RemoveRoutineBlock {
        routine_id: BlockId,
        reply: oneshot::Sender<CoreResult<RoutineView>>,
    },
    RequestUnblock {
        target: UnblockTarget,
        reply: oneshot::Sender<CoreResult<UnblockOutcome>>,
    },
    CancelUnblock {
        target: Option<UnblockTarget>,
        reply: oneshot::Sender<Vec<UnblockTarget>>,
    },
    SetCoolingPeriod {
        cooling_period: Duration,
        reply: oneshot::Sender<CoreResult<Duration>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    Persistable {
        reply: oneshot::Sender<RegistrySnapshot>,
    },
    ReconcileState {
        reply: oneshot::Sender<ReconcileState>,
    },
}

/// Cloneable handle to the engine actor
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<CoreEvent>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> CoreResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| CoreError::EngineUnavailable)?;
        rx.await.map_err(|_| CoreError::EngineUnavailable)
    }

    pub async fn request_app_block(
        &self,
        name: impl Into<String>,
        duration: Duration,
    ) -> CoreResult<AppBlockView> {
        let name = name.into();
        self.call(|reply| EngineCommand::RequestAppBlock {
            name,
            duration,
            reply,
        })
        .await?
    }

    pub async fn request_internet_block(&self, duration: Duration) -> CoreResult<InternetBlockView> {
        self.call(|reply| EngineCommand::RequestInternetBlock { duration, reply })
            .await?
    }

    pub async fn extend_internet_block(&self, duration: Duration) -> CoreResult<InternetBlockView> {
        self.call(|reply| EngineCommand::ExtendInternetBlock { duration, reply })
            .await?
    }

    pub async fn request_routine_block(&self, request: RoutineRequest) -> CoreResult<RoutineView> {
        self.call(|reply| EngineCommand::RequestRoutineBlock { request, reply })
            .await?
    }

    pub async fn remove_routine_block(&self, routine_id: BlockId) -> CoreResult<RoutineView> {
        self.call(|reply| EngineCommand::RemoveRoutineBlock { routine_id, reply })
            .await?
    }

    pub async fn request_unblock(&self, target: UnblockTarget) -> CoreResult<UnblockOutcome> {
        self.call(|reply| EngineCommand::RequestUnblock { target, reply })
            .await?
    }

    pub async fn cancel_unblock(
        &self,
        target: Option<UnblockTarget>,
    ) -> CoreResult<Vec<UnblockTarget>> {
        self.call(|reply| EngineCommand::CancelUnblock { target, reply })
            .await
    }

    pub async fn set_cooling_period(&self, cooling_period: Duration) -> CoreResult<Duration> {
        self.call(|reply| EngineCommand::SetCoolingPeriod {
            cooling_period,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> CoreResult<StateSnapshot> {
        self.call(|reply| EngineCommand::Snapshot { reply }).await
    }

    /// Compacted registry for persistence
    pub async fn registry_snapshot(&self) -> CoreResult<RegistrySnapshot> {
        self.call(|reply| EngineCommand::Persistable { reply }).await
    }

    /// Registry clone plus any queued releases, drained atomically
    pub async fn reconcile_state(&self) -> CoreResult<ReconcileState> {
        self.call(|reply| EngineCommand::ReconcileState { reply })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Sender for events produced outside the actor (reconciler)
    pub fn event_sender(&self) -> broadcast::Sender<CoreEvent> {
        self.events.clone()
    }
}

/// Start the engine actor.
///
/// The actor commits due unblock countdowns every `gate_tick` and wakes the
/// reconciler through `wake` whenever a commit queues a release. The task
/// returns the engine when `cancel` fires so the caller can persist it.
pub fn spawn_engine(
    engine: BlockEngine,
    clock: Arc<dyn Clock>,
    gate_tick: Duration,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) -> (EngineHandle, JoinHandle<BlockEngine>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let (events, _) = broadcast::channel(EVENT_QUEUE);

    let handle = EngineHandle {
        tx,
        events: events.clone(),
    };
    let task = tokio::spawn(run_actor(engine, clock, gate_tick, wake, cancel, rx, events));
    (handle, task)
}

async fn run_actor(
    mut engine: BlockEngine,
    clock: Arc<dyn Clock>,
    gate_tick: Duration,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<EngineCommand>,
    events: broadcast::Sender<CoreEvent>,
) -> BlockEngine {
    let mut ticker = tokio::time::interval(gate_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Engine actor started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => handle_command(&mut engine, command, clock.now()),
                None => break,
            },
            _ = ticker.tick() => engine.tick(clock.now()),
        }

        for event in engine.drain_events() {
            debug!(?event, "Core event");
            let _ = events.send(event);
        }

        if engine.has_pending_releases() {
            wake.notify_one();
        }
    }

    info!("Engine actor stopped");
    engine
}

fn handle_command(
    engine: &mut BlockEngine,
    command: EngineCommand,
    now: chrono::DateTime<chrono::Local>,
) {
    // Replies are dropped silently when the caller went away
    match command {
        EngineCommand::RequestAppBlock {
            name,
            duration,
            reply,
        } => {
            let _ = reply.send(engine.request_app_block(&name, duration, now));
        }
        EngineCommand::RequestInternetBlock { duration, reply } => {
            let _ = reply.send(engine.request_internet_block(duration, now));
        }
        EngineCommand::ExtendInternetBlock { duration, reply } => {
            let _ = reply.send(engine.extend_internet_block(duration, now));
        }
        EngineCommand::RequestRoutineBlock { request, reply } => {
            let _ = reply.send(engine.request_routine_block(&request, now));
        }
        EngineCommand::RemoveRoutineBlock { routine_id, reply } => {
            let _ = reply.send(engine.remove_routine_block(routine_id, now));
        }
        EngineCommand::RequestUnblock { target, reply } => {
            let _ = reply.send(engine.request_unblock(target, now));
        }
        EngineCommand::CancelUnblock { target, reply } => {
            let _ = reply.send(engine.cancel_unblock(target.as_ref(), now));
        }
        EngineCommand::SetCoolingPeriod {
            cooling_period,
            reply,
        } => {
            let _ = reply.send(engine.set_cooling_period(cooling_period, now));
        }
        EngineCommand::Snapshot { reply } => {
            // Commit anything due first so the view never shows an
            // expired countdown
            engine.tick(now);
            let _ = reply.send(engine.snapshot(now));
        }
        EngineCommand::Persistable { reply } => {
            let _ = reply.send(engine.persistable(now));
        }
        EngineCommand::ReconcileState { reply } => {
            engine.tick(now);
            let state = ReconcileState {
                registry: engine.registry().clone(),
                releases: engine.take_releases(),
            };
            let _ = reply.send(state);
        }
    }
}
