//! In-memory collaborators for unit and integration testing

use async_trait::async_trait;
use detox_util::AppName;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{
    NetworkController, NetworkError, NetworkResult, ProcessController, ProcessError, ProcessInfo,
    ProcessResult, TerminateReport,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mock process table
///
/// Processes are added with [`MockProcessController::launch`]; terminate
/// removes matching entries and records the call.
pub struct MockProcessController {
    next_pid: AtomicU32,
    processes: Arc<Mutex<Vec<ProcessInfo>>>,
    terminate_calls: Arc<Mutex<Vec<AppName>>>,

    /// Configure terminate to fail
    pub fail_terminate: Arc<Mutex<bool>>,

    /// Delay every terminate call (simulates a hung kill)
    pub terminate_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockProcessController {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            processes: Arc::new(Mutex::new(Vec::new())),
            terminate_calls: Arc::new(Mutex::new(Vec::new())),
            fail_terminate: Arc::new(Mutex::new(false)),
            terminate_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Simulate a process starting; returns its pid
    pub fn launch(&self, name: &str) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        lock(&self.processes).push(ProcessInfo::new(pid, name));
        pid
    }

    pub fn is_running(&self, name: &str) -> bool {
        let target = AppName::new(name);
        lock(&self.processes).iter().any(|p| target.matches(&p.name))
    }

    /// Every name passed to terminate, in call order
    pub fn terminate_calls(&self) -> Vec<AppName> {
        lock(&self.terminate_calls).clone()
    }

    pub fn terminate_count(&self, name: &str) -> usize {
        let target = AppName::new(name);
        lock(&self.terminate_calls)
            .iter()
            .filter(|n| **n == target)
            .count()
    }

    pub fn set_fail_terminate(&self, fail: bool) {
        *lock(&self.fail_terminate) = fail;
    }

    pub fn set_terminate_delay(&self, delay: Option<Duration>) {
        *lock(&self.terminate_delay) = delay;
    }
}

impl Default for MockProcessController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessController for MockProcessController {
    async fn list_processes(&self) -> ProcessResult<Vec<ProcessInfo>> {
        Ok(lock(&self.processes).clone())
    }

    async fn terminate(&self, name: &AppName) -> ProcessResult<TerminateReport> {
        lock(&self.terminate_calls).push(name.clone());

        let delay = *lock(&self.terminate_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *lock(&self.fail_terminate) {
            return Err(ProcessError::KillFailed {
                name: name.to_string(),
                pid: 0,
                reason: "Mock terminate failure".into(),
            });
        }

        let mut processes = lock(&self.processes);
        let mut killed = Vec::new();
        processes.retain(|p| {
            if name.matches(&p.name) {
                killed.push(p.pid);
                false
            } else {
                true
            }
        });

        Ok(TerminateReport { killed })
    }
}

/// Mock network switch that records every call
pub struct MockNetworkController {
    enabled: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<bool>>>,

    /// Configure set_network_enabled to fail
    pub fail: Arc<Mutex<bool>>,
}

impl MockNetworkController {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(Mutex::new(true)),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *lock(&self.enabled)
    }

    /// Every value passed to set_network_enabled, in call order
    pub fn calls(&self) -> Vec<bool> {
        lock(&self.calls).clone()
    }

    pub fn enable_calls(&self) -> usize {
        lock(&self.calls).iter().filter(|c| **c).count()
    }

    pub fn disable_calls(&self) -> usize {
        lock(&self.calls).iter().filter(|c| !**c).count()
    }

    pub fn set_fail(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }
}

impl Default for MockNetworkController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkController for MockNetworkController {
    async fn set_network_enabled(&self, enabled: bool) -> NetworkResult<()> {
        lock(&self.calls).push(enabled);

        if *lock(&self.fail) {
            return Err(NetworkError::CommandFailed {
                command: "mock".into(),
                message: "Mock network failure".into(),
            });
        }

        *lock(&self.enabled) = enabled;
        Ok(())
    }
}
