//! detoxd - The detox background service
//!
//! This is the main entry point for the detoxd service.
//! It wires together all the components:
//! - Configuration loading
//! - Snapshot restore and audit log
//! - Block engine actor
//! - Reconciler (process and network enforcement)
//! - Autosave
//! - IPC server

mod autosave;
mod dispatch;

use anyhow::{Context, Result};
use clap::Parser;
use detox_api::{ErrorCode, ErrorInfo, Event, EventPayload, Response};
use detox_config::{DaemonSettings, NetworkBackend, NetworkSettings, load_config_or_default};
use detox_core::{
    BlockEngine, EngineHandle, Reconciler, ReconcilerConfig, Registry, spawn_engine,
};
use detox_host_api::{NetworkController, ProcessController};
use detox_host_linux::{LinuxNetworkController, LinuxProcessController};
use detox_ipc::{IpcServer, ServerMessage};
use detox_store::{
    AuditEvent, AuditEventType, AuditLog, JsonSnapshotStore, SnapshotStore, SqliteAuditLog,
};
use detox_util::{Clock, RateLimiter, SystemClock, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::autosave::run_autosave;
use crate::dispatch::{Dispatcher, event_payload, refreshes_state};

/// How often the engine actor checks for due unblock countdowns
const GATE_TICK: Duration = Duration::from_secs(1);

/// detoxd - App and internet blocking service
#[derive(Parser, Debug)]
#[command(name = "detoxd")]
#[command(about = "App and internet blocking with a cooling-off unblock gate", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/detoxd/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set DETOX_SOCKET env var)
    #[arg(short, long, env = "DETOX_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set DETOX_DATA_DIR env var)
    #[arg(short, long, env = "DETOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    settings: DaemonSettings,
    registry: Registry,
    clock: Arc<dyn Clock>,
    process: Arc<dyn ProcessController>,
    network: Arc<dyn NetworkController>,
    snapshots: Arc<dyn SnapshotStore>,
    audit: Arc<dyn AuditLog>,
    ipc: Arc<IpcServer>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let mut settings = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        if let Some(socket) = &args.socket {
            settings.socket_path = socket.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            settings.data_dir = data_dir.clone();
        }

        info!(
            config_path = %args.config.display(),
            tick_ms = settings.tick_interval.as_millis() as u64,
            network_backend = %settings.network.backend,
            "Configuration loaded"
        );

        // Create data directory
        std::fs::create_dir_all(&settings.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", settings.data_dir))?;

        // Initialize stores
        let db_path = settings.audit_db_path();
        let audit: Arc<dyn AuditLog> = Arc::new(
            SqliteAuditLog::open(&db_path)
                .with_context(|| format!("Failed to open audit database {:?}", db_path))?,
        );
        let snapshots: Arc<dyn SnapshotStore> =
            Arc::new(JsonSnapshotStore::new(settings.snapshot_path()));

        info!(
            db_path = %db_path.display(),
            snapshot_path = %settings.snapshot_path().display(),
            "Stores initialized"
        );

        let _ = audit.append_audit(AuditEvent::new(AuditEventType::DaemonStarted));

        let registry = restore_registry(snapshots.as_ref(), audit.as_ref(), &settings);

        // Initialize host collaborators
        let uid = nix::unistd::getuid();
        if !uid.is_root() {
            warn!(uid = uid.as_raw(), "Not running as root; some processes may not be killable");
        }
        let process: Arc<dyn ProcessController> = Arc::new(LinuxProcessController::new());
        let network: Arc<dyn NetworkController> =
            Arc::new(network_controller(&settings.network).await);

        // Initialize IPC server
        let mut ipc = IpcServer::new(&settings.socket_path);
        ipc.start().await?;

        info!(socket_path = %settings.socket_path.display(), "IPC server started");

        // Rate limiter: 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            settings,
            registry,
            clock: Arc::new(SystemClock),
            process,
            network,
            snapshots,
            audit,
            ipc: Arc::new(ipc),
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());

        // Start the engine actor
        let engine = BlockEngine::new(self.registry, self.audit.clone());
        let (handle, engine_task) = spawn_engine(
            engine,
            self.clock.clone(),
            GATE_TICK,
            wake.clone(),
            cancel.clone(),
        );
        let mut core_events = handle.subscribe();

        // Start the reconciler
        let reconciler = Reconciler::new(
            self.process.clone(),
            self.network.clone(),
            self.clock.clone(),
            ReconcilerConfig {
                tick_interval: self.settings.tick_interval,
                worker_interval: self.settings.worker_interval,
                call_timeout: self.settings.collaborator_timeout,
                restore_network_on_start: self.settings.restore_network_on_start,
            },
            handle.event_sender(),
        );
        let reconciler_task =
            tokio::spawn(reconciler.run(handle.clone(), wake.clone(), cancel.clone()));

        // Start autosave
        let autosave_task = tokio::spawn(run_autosave(
            handle.clone(),
            self.snapshots.clone(),
            self.settings.autosave_interval,
            cancel.clone(),
        ));

        let dispatcher = Dispatcher::new(
            handle.clone(),
            self.process.clone(),
            self.snapshots.clone(),
            self.audit.clone(),
            self.clock.clone(),
            self.settings.collaborator_timeout,
        );

        // Get channels
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;
        let rate_limiter = Arc::new(Mutex::new(self.rate_limiter));

        // Spawn IPC accept task
        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                // Signal: SIGTERM, SIGINT or SIGHUP - graceful shutdown
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Core events - forward to subscribers
                event = core_events.recv() => {
                    match event {
                        Ok(event) => Self::forward_core_event(&handle, &ipc_ref, event).await,
                        Err(RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Event forwarding lagged");
                            Self::broadcast_state(&handle, &ipc_ref).await;
                        }
                        Err(RecvError::Closed) => {
                            error!("Block engine stopped unexpectedly");
                            break;
                        }
                    }
                }

                // IPC messages
                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&dispatcher, &handle, &ipc_ref, &rate_limiter, msg).await;
                }
            }
        }

        // Graceful shutdown
        info!("Shutting down detoxd");
        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));

        cancel.cancel();
        if let Err(e) = reconciler_task.await {
            warn!(error = %e, "Reconciler task failed");
        }
        if let Err(e) = autosave_task.await {
            warn!(error = %e, "Autosave task failed");
        }

        // Final save from the engine the actor hands back
        match engine_task.await {
            Ok(engine) => {
                let snapshot = engine.persistable(self.clock.now());
                if let Err(e) = self.snapshots.save(&snapshot) {
                    warn!(error = %e, "Failed to save registry on shutdown");
                } else {
                    info!("Registry saved");
                }
            }
            Err(e) => error!(error = %e, "Engine task failed, registry not saved"),
        }

        ipc_ref.shutdown();

        if let Err(e) = self
            .audit
            .append_audit(AuditEvent::new(AuditEventType::DaemonStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    async fn forward_core_event(
        engine: &EngineHandle,
        ipc: &Arc<IpcServer>,
        event: detox_core::CoreEvent,
    ) {
        let refresh = refreshes_state(&event);
        ipc.broadcast_event(Event::new(event_payload(event)));

        if refresh {
            Self::broadcast_state(engine, ipc).await;
        }
    }

    async fn broadcast_state(engine: &EngineHandle, ipc: &Arc<IpcServer>) {
        match engine.snapshot().await {
            Ok(state) => ipc.broadcast_event(Event::new(EventPayload::StateChanged(state))),
            Err(e) => debug!(error = %e, "No state to broadcast"),
        }
    }

    async fn handle_ipc_message(
        dispatcher: &Dispatcher,
        engine: &EngineHandle,
        ipc: &Arc<IpcServer>,
        rate_limiter: &Arc<Mutex<RateLimiter>>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                // Rate limiting
                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check(&client_id) {
                        let response = Response::error(
                            request.request_id,
                            ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                        );
                        let _ = ipc.send_response(&client_id, response).await;
                        return;
                    }
                }

                let subscribing = matches!(request.command, detox_api::Command::SubscribeEvents);
                let response = dispatcher
                    .handle(&client_id, request.request_id, request.command)
                    .await;
                let _ = ipc.send_response(&client_id, response).await;

                // New subscribers start from a full snapshot
                if subscribing && let Ok(state) = engine.snapshot().await {
                    let event = Event::new(EventPayload::StateChanged(state));
                    let _ = ipc.send_event(&client_id, event).await;
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, uid = ?info.uid, "Client connected");
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                // Clean up rate limiter
                let mut limiter = rate_limiter.lock().await;
                limiter.remove_client(&client_id);
            }
        }
    }
}

/// Load the saved registry; anything unreadable starts an empty one
fn restore_registry(
    snapshots: &dyn SnapshotStore,
    audit: &dyn AuditLog,
    settings: &DaemonSettings,
) -> Registry {
    match snapshots.load() {
        Ok(Some(snapshot)) => {
            let registry = Registry::from_snapshot(snapshot);
            info!(
                app_blocks = registry.app_blocks().len(),
                routines = registry.routines().len(),
                internet_blocks = registry.internet_blocks().len(),
                "Registry restored"
            );
            let _ = audit.append_audit(AuditEvent::new(AuditEventType::SnapshotRestored {
                app_blocks: registry.app_blocks().len(),
                routines: registry.routines().len(),
                internet_blocks: registry.internet_blocks().len(),
            }));
            registry
        }
        Ok(None) => {
            info!("No saved registry, starting empty");
            Registry::new(settings.default_cooling_period)
        }
        Err(e) => {
            warn!(error = %e, "Failed to load saved registry, starting empty");
            Registry::new(settings.default_cooling_period)
        }
    }
}

async fn network_controller(settings: &NetworkSettings) -> LinuxNetworkController {
    match settings.backend {
        NetworkBackend::Auto => LinuxNetworkController::detect(settings.interfaces.clone()).await,
        NetworkBackend::Nmcli => LinuxNetworkController::nmcli(),
        NetworkBackend::Ip => LinuxNetworkController::ip(settings.interfaces.clone()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "detoxd starting");

    // Create and run the service
    let service = Service::new(&args).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use detox_store::MemorySnapshotStore;

    #[test]
    fn restore_falls_back_to_default_cooling() {
        let settings = DaemonSettings {
            default_cooling_period: Duration::from_secs(5 * 60),
            ..DaemonSettings::default()
        };
        let audit = SqliteAuditLog::in_memory().unwrap();

        let registry = restore_registry(&MemorySnapshotStore::new(), &audit, &settings);
        assert_eq!(registry.cooling_period(), Duration::from_secs(5 * 60));
        assert!(registry.app_blocks().is_empty());
    }

    #[test]
    fn restore_uses_saved_cooling_and_audits() {
        let mut saved = Registry::new(Duration::from_secs(30 * 60));
        saved.block_internet(Duration::from_secs(3600), detox_util::now());
        let store = MemorySnapshotStore::with_snapshot(saved.to_snapshot(detox_util::now()));
        let audit = SqliteAuditLog::in_memory().unwrap();

        let registry = restore_registry(&store, &audit, &DaemonSettings::default());
        assert_eq!(registry.cooling_period(), Duration::from_secs(30 * 60));
        assert_eq!(registry.internet_blocks().len(), 1);

        let recent = audit.get_recent_audits(1).unwrap();
        assert!(matches!(
            recent[0].event,
            AuditEventType::SnapshotRestored {
                internet_blocks: 1,
                ..
            }
        ));
    }

    #[test]
    fn args_parse_overrides() {
        let args = Args::parse_from([
            "detoxd",
            "--socket",
            "/tmp/detox.sock",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/detox.sock")));
        assert_eq!(args.log_level, "debug");
    }
}
