//! Per-app enforcement worker

use chrono::{DateTime, Local};
use detox_host_api::ProcessController;
use detox_util::{AppName, Clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Worker timing
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Pause between termination attempts
    pub interval: Duration,
    /// Upper bound on one termination call
    pub call_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            call_timeout: Duration::from_secs(3),
        }
    }
}

/// Background task that keeps terminating one app until its deadline
#[derive(Debug)]
pub struct TargetWorker {
    name: AppName,
    end: DateTime<Local>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TargetWorker {
    pub fn spawn(
        name: AppName,
        end: DateTime<Local>,
        process: Arc<dyn ProcessController>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            name.clone(),
            end,
            process,
            clock,
            config,
            cancel.clone(),
        ));

        info!(app = %name, until = %end, "Enforcement worker started");

        Self {
            name,
            end,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &AppName {
        &self.name
    }

    pub fn end(&self) -> DateTime<Local> {
        self.end
    }

    /// Whether the task has exited on its own or after `stop`
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the worker to exit; takes effect before its next attempt
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the task to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            warn!(app = %self.name, "Enforcement worker panicked");
        }
    }
}

async fn run_worker(
    name: AppName,
    end: DateTime<Local>,
    process: Arc<dyn ProcessController>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(app = %name, "Enforcement worker cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        if clock.now() >= end {
            info!(app = %name, "Block ended, enforcement worker exiting");
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(app = %name, "Enforcement worker cancelled mid-attempt");
                return;
            }
            result = tokio::time::timeout(config.call_timeout, process.terminate(&name)) => {
                match result {
                    Ok(Ok(report)) if report.killed_any() => {
                        info!(app = %name, pids = ?report.killed, "Terminated blocked app");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(app = %name, error = %e, "Termination attempt failed"),
                    Err(_) => warn!(app = %name, "Termination attempt timed out"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use detox_host_api::MockProcessController;
    use detox_util::ManualClock;

    fn config() -> WorkerConfig {
        WorkerConfig {
            interval: Duration::from_millis(10),
            call_timeout: Duration::from_millis(100),
        }
    }

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 12, 29, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn worker_kills_until_end_then_exits() {
        let process = Arc::new(MockProcessController::new());
        let clock = Arc::new(ManualClock::new(start()));
        process.launch("game.exe");

        let worker = TargetWorker::spawn(
            AppName::new("game.exe"),
            start() + chrono::Duration::minutes(1),
            process.clone(),
            clock.clone(),
            config(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!process.is_running("game.exe"));
        assert!(!worker.is_finished());

        // Relaunched app is killed again
        process.launch("game.exe");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!process.is_running("game.exe"));

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.is_finished());

        process.launch("game.exe");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(process.is_running("game.exe"));
    }

    #[tokio::test]
    async fn stopped_worker_makes_no_further_attempts() {
        let process = Arc::new(MockProcessController::new());
        let clock = Arc::new(ManualClock::new(start()));

        let worker = TargetWorker::spawn(
            AppName::new("game.exe"),
            start() + chrono::Duration::hours(1),
            process.clone(),
            clock,
            config(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        worker.shutdown().await;

        let attempts = process.terminate_count("game.exe");
        assert!(attempts > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(process.terminate_count("game.exe"), attempts);
    }

    #[tokio::test]
    async fn slow_controller_is_bounded_by_timeout() {
        let process = Arc::new(MockProcessController::new());
        process.set_terminate_delay(Some(Duration::from_secs(10)));
        let clock = Arc::new(ManualClock::new(start()));

        let worker = TargetWorker::spawn(
            AppName::new("game.exe"),
            start() + chrono::Duration::hours(1),
            process.clone(),
            clock,
            config(),
        );

        // Several attempts fit in the time of one hung call
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(process.terminate_count("game.exe") >= 2);

        worker.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(worker.is_finished());
    }
}
