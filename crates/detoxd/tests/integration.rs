//! Integration tests for detoxd
//!
//! These tests run the engine actor, the reconciler, persistence and IPC
//! together against mock collaborators.

use chrono::{Local, TimeZone};
use detox_api::{
    Command, Event, EventPayload, Response, ResponsePayload, UnblockOutcome, UnblockTarget,
};
use detox_core::{
    BlockEngine, CoreEvent, EngineHandle, Reconciler, ReconcilerConfig, Registry, spawn_engine,
};
use detox_host_api::{MockNetworkController, MockProcessController};
use detox_ipc::{IpcClient, IpcServer, ServerMessage};
use detox_store::{JsonSnapshotStore, SnapshotStore, SqliteAuditLog};
use detox_util::{AppName, ManualClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct Harness {
    handle: EngineHandle,
    clock: Arc<ManualClock>,
    process: Arc<MockProcessController>,
    network: Arc<MockNetworkController>,
    events: broadcast::Receiver<CoreEvent>,
    cancel: CancellationToken,
}

fn start(registry: Registry) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Local.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
    ));
    let process = Arc::new(MockProcessController::new());
    let network = Arc::new(MockNetworkController::new());
    let cancel = CancellationToken::new();
    let wake = Arc::new(Notify::new());

    let engine = BlockEngine::new(registry, Arc::new(SqliteAuditLog::in_memory().unwrap()));
    let (handle, _engine_task) = spawn_engine(
        engine,
        clock.clone(),
        Duration::from_millis(20),
        wake.clone(),
        cancel.clone(),
    );
    let events = handle.subscribe();

    let reconciler = Reconciler::new(
        process.clone(),
        network.clone(),
        clock.clone(),
        ReconcilerConfig {
            tick_interval: Duration::from_millis(20),
            worker_interval: Duration::from_millis(10),
            call_timeout: Duration::from_millis(200),
            restore_network_on_start: false,
        },
        handle.event_sender(),
    );
    tokio::spawn(reconciler.run(handle.clone(), wake, cancel.clone()));

    Harness {
        handle,
        clock,
        process,
        network,
        events,
        cancel,
    }
}

async fn wait_for(
    events: &mut broadcast::Receiver<CoreEvent>,
    pred: impl Fn(&CoreEvent) -> bool,
) -> CoreEvent {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event not observed in time")
}

#[tokio::test]
async fn test_app_block_enforced_until_expiry() {
    let mut h = start(Registry::default());
    h.process.launch("game.exe");

    h.handle
        .request_app_block("game.exe", Duration::from_secs(60))
        .await
        .unwrap();

    wait_for(&mut h.events, |e| {
        matches!(e, CoreEvent::EnforcementStarted { name, .. } if name.as_str() == "game.exe")
    })
    .await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!h.process.is_running("game.exe"));

    // Relaunches are killed while the block holds
    h.process.launch("game.exe");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!h.process.is_running("game.exe"));

    // One minute later the block is over and the worker stops
    h.clock.advance(Duration::from_secs(61));
    wait_for(&mut h.events, |e| matches!(e, CoreEvent::EnforcementStopped { .. })).await;

    h.process.launch("game.exe");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(h.process.is_running("game.exe"));

    h.cancel.cancel();
}

#[tokio::test]
async fn test_internet_unblock_with_zero_cooling() {
    let mut h = start(Registry::default());

    h.handle
        .request_internet_block(Duration::from_secs(600))
        .await
        .unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, CoreEvent::NetworkEnforcement { blocked: true })
    })
    .await;
    assert!(!h.network.is_enabled());

    h.handle.set_cooling_period(Duration::ZERO).await.unwrap();
    let outcome = h.handle.request_unblock(UnblockTarget::Internet).await.unwrap();
    assert_eq!(
        outcome,
        UnblockOutcome::Committed {
            target: UnblockTarget::Internet
        }
    );

    wait_for(&mut h.events, |e| {
        matches!(e, CoreEvent::NetworkEnforcement { blocked: false })
    })
    .await;

    // Let a few more reconcile ticks pass: the network is enabled exactly once
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.network.is_enabled());
    assert_eq!(h.network.calls(), vec![false, true]);

    h.cancel.cancel();
}

#[tokio::test]
async fn test_app_unblock_after_cooling_period() {
    let mut h = start(Registry::new(Duration::from_secs(5 * 60)));

    h.handle
        .request_app_block("chat", Duration::from_secs(3600))
        .await
        .unwrap();
    wait_for(&mut h.events, |e| matches!(e, CoreEvent::EnforcementStarted { .. })).await;

    let outcome = h.handle.request_unblock(UnblockTarget::app("chat")).await.unwrap();
    let countdown = outcome.countdown().cloned().unwrap();
    assert_eq!(countdown.remaining, Duration::from_secs(5 * 60));

    // Still enforced mid-countdown
    h.clock.advance(Duration::from_secs(4 * 60));
    let state = h.handle.snapshot().await.unwrap();
    assert_eq!(state.blocked_apps.len(), 1);
    assert_eq!(
        state.countdown_for(&UnblockTarget::app("chat")).unwrap().remaining,
        Duration::from_secs(60)
    );

    h.clock.advance(Duration::from_secs(61));
    wait_for(&mut h.events, |e| {
        matches!(e, CoreEvent::UnblockCommitted { target } if *target == UnblockTarget::app("chat"))
    })
    .await;
    wait_for(&mut h.events, |e| {
        matches!(e, CoreEvent::EnforcementStopped { name } if name.as_str() == "chat")
    })
    .await;

    let state = h.handle.snapshot().await.unwrap();
    assert!(state.blocked_apps.is_empty());
    assert!(state.countdowns.is_empty());

    h.cancel.cancel();
}

#[tokio::test]
async fn test_registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonSnapshotStore::new(dir.path().join("blocks.json"));

    let h = start(Registry::new(Duration::from_secs(10 * 60)));
    h.handle
        .request_app_block("game.exe", Duration::from_secs(3600))
        .await
        .unwrap();
    h.handle
        .request_internet_block(Duration::from_secs(1800))
        .await
        .unwrap();
    store
        .save(&h.handle.registry_snapshot().await.unwrap())
        .unwrap();
    h.cancel.cancel();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(json["coolingPeriodMinutes"], 10);
    assert_eq!(json["blockedApps"][0]["name"], "game.exe");
    assert_eq!(json["internetBlocks"].as_array().unwrap().len(), 1);

    let restored = Registry::from_snapshot(store.load().unwrap().unwrap());
    assert_eq!(restored.cooling_period(), Duration::from_secs(10 * 60));
    assert_eq!(restored.app_blocks()[0].name, AppName::new("game.exe"));
    assert_eq!(restored.internet_blocks().len(), 1);
}

/// Minimal request loop answering state queries from the engine
async fn serve(server: Arc<IpcServer>, handle: EngineHandle) {
    let mut messages = server.take_message_receiver().await.unwrap();
    while let Some(msg) = messages.recv().await {
        if let ServerMessage::Request { client_id, request } = msg {
            let payload = match request.command {
                Command::GetState => ResponsePayload::State(handle.snapshot().await.unwrap()),
                Command::SubscribeEvents => ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
                _ => ResponsePayload::Pong,
            };
            let _ = server
                .send_response(&client_id, Response::success(request.request_id, payload))
                .await;
        }
    }
}

#[tokio::test]
async fn test_state_over_ipc() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("detoxd.sock");

    let h = start(Registry::default());
    h.handle
        .request_internet_block(Duration::from_secs(900))
        .await
        .unwrap();

    let mut server = IpcServer::new(&socket);
    server.start().await.unwrap();
    let server = Arc::new(server);
    let accept = server.clone();
    tokio::spawn(async move {
        let _ = accept.run().await;
    });
    tokio::spawn(serve(server.clone(), h.handle.clone()));

    let mut client = IpcClient::connect(&socket).await.unwrap();
    match client.call(Command::GetState).await.unwrap() {
        ResponsePayload::State(state) => {
            assert!(state.internet_blocked());
            assert_eq!(state.cooling_period, Duration::from_secs(15 * 60));
        }
        other => panic!("unexpected payload: {:?}", other),
    }

    let mut stream = IpcClient::connect(&socket)
        .await
        .unwrap()
        .subscribe()
        .await
        .unwrap();
    server.broadcast_event(Event::new(EventPayload::NetworkEnforcement { blocked: true }));

    let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event.payload,
        EventPayload::NetworkEnforcement { blocked: true }
    ));

    h.cancel.cancel();
}
