//! Process enumeration and termination

use async_trait::async_trait;
use detox_host_api::{ProcessController, ProcessError, ProcessInfo, ProcessResult, TerminateReport};
use detox_util::AppName;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::{Arc, Mutex};
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Process controller backed by `/proc` (via sysinfo) and `kill(2)`
pub struct LinuxProcessController {
    system: Arc<Mutex<System>>,
    own_pid: u32,
}

impl LinuxProcessController {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            own_pid: std::process::id(),
        }
    }

    /// Refresh the process table off the async runtime
    async fn snapshot(&self) -> ProcessResult<Vec<Candidate>> {
        let system = self.system.clone();
        let own_pid = self.own_pid;

        tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(|e| e.into_inner());
            system.refresh_processes(ProcessesToUpdate::All);

            system
                .processes()
                .iter()
                .filter(|(pid, _)| pid.as_u32() != own_pid)
                .map(|(pid, process)| Candidate {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    exe_name: process
                        .exe()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned()),
                })
                .collect()
        })
        .await
        .map_err(|e| ProcessError::Enumeration(e.to_string()))
    }
}

impl Default for LinuxProcessController {
    fn default() -> Self {
        Self::new()
    }
}

struct Candidate {
    pid: u32,
    name: String,
    /// File name of the executable; `name` is truncated to 15 bytes by the kernel
    exe_name: Option<String>,
}

impl Candidate {
    fn matches(&self, target: &AppName) -> bool {
        target.matches(&self.name) || self.exe_name.as_deref().is_some_and(|n| target.matches(n))
    }
}

/// Send SIGKILL to one pid. `Ok(false)` when the process was already gone.
fn kill_pid(name: &AppName, pid: u32) -> ProcessResult<bool> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };

    match signal::kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => {
            debug!(app = %name, pid, "Process already exited");
            Ok(false)
        }
        Err(Errno::EPERM) => Err(ProcessError::PermissionDenied {
            name: name.to_string(),
            pid,
        }),
        Err(e) => Err(ProcessError::KillFailed {
            name: name.to_string(),
            pid,
            reason: e.to_string(),
        }),
    }
}

#[async_trait]
impl ProcessController for LinuxProcessController {
    async fn list_processes(&self) -> ProcessResult<Vec<ProcessInfo>> {
        let mut processes: Vec<ProcessInfo> = self
            .snapshot()
            .await?
            .into_iter()
            .map(|c| ProcessInfo::new(c.pid, c.name))
            .collect();
        processes.sort_by(|a, b| a.name.cmp(&b.name).then(a.pid.cmp(&b.pid)));
        Ok(processes)
    }

    async fn terminate(&self, name: &AppName) -> ProcessResult<TerminateReport> {
        let mut report = TerminateReport::none();
        let mut first_error = None;

        for candidate in self.snapshot().await?.iter().filter(|c| c.matches(name)) {
            match kill_pid(name, candidate.pid) {
                Ok(true) => report.killed.push(candidate.pid),
                Ok(false) => {}
                Err(e) => {
                    warn!(app = %name, pid = candidate.pid, error = %e, "Kill failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        // Partial success still counts; report the error only if nothing died
        match first_error {
            Some(e) if !report.killed_any() => Err(e),
            _ => Ok(report),
        }
    }
}
