//! Periodic and change-driven registry persistence

use detox_core::{CoreError, EngineHandle};
use detox_store::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between a registry change and the save it triggers; bursts coalesce
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Save the registry every `interval` and shortly after any change.
///
/// Returns when `cancel` fires or the engine goes away. The final save on
/// shutdown is the caller's job, from the engine the actor hands back.
pub async fn run_autosave(
    engine: EngineHandle,
    store: Arc<dyn SnapshotStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut events = engine.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    let mut pending: Option<Instant> = None;

    info!(interval_secs = interval.as_secs(), "Autosave started");

    loop {
        let deadline = pending;
        let debounce = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = debounce => {}
            event = events.recv() => {
                match event {
                    Ok(event) if event.changes_registry() => {
                        pending.get_or_insert_with(|| Instant::now() + SAVE_DEBOUNCE);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Autosave lagged behind events");
                        pending.get_or_insert_with(|| Instant::now() + SAVE_DEBOUNCE);
                    }
                    Err(RecvError::Closed) => break,
                }
                continue;
            }
        }

        pending = None;
        match save_once(&engine, store.as_ref()).await {
            Ok(()) => {}
            Err(CoreError::EngineUnavailable) => break,
            Err(e) => warn!(error = %e, "Autosave failed"),
        }
    }

    debug!("Autosave stopped");
}

/// Fetch the compacted registry and write it; store errors are logged only
async fn save_once(engine: &EngineHandle, store: &dyn SnapshotStore) -> Result<(), CoreError> {
    let snapshot = engine.registry_snapshot().await?;
    if let Err(e) = store.save(&snapshot) {
        warn!(error = %e, "Failed to save registry snapshot");
    } else {
        debug!(
            app_blocks = snapshot.blocked_apps.len(),
            routines = snapshot.routine_blocks.len(),
            internet_blocks = snapshot.internet_blocks.len(),
            "Registry saved"
        );
    }
    Ok(())
}
