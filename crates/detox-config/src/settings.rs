//! Validated settings ready for use by the daemon

use crate::schema::{RawConfig, RawDaemonConfig, RawNetworkConfig};
use detox_util::{AUDIT_DB_FILENAME, SNAPSHOT_FILENAME, default_data_dir, default_socket_path};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_WORKER_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_AUTOSAVE_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_COOLING_PERIOD_MINUTES: u64 = 15;

/// Validated daemon settings
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub worker_interval: Duration,
    pub collaborator_timeout: Duration,
    pub autosave_interval: Duration,
    pub restore_network_on_start: bool,
    pub network: NetworkSettings,
    /// Cooling period used when no snapshot exists yet
    pub default_cooling_period: Duration,
}

impl DaemonSettings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let RawDaemonConfig {
            socket_path,
            data_dir,
            tick_interval_ms,
            worker_interval_ms,
            collaborator_timeout_ms,
            autosave_interval_seconds,
            restore_network_on_start,
        } = raw.daemon;

        Self {
            socket_path: socket_path.unwrap_or_else(default_socket_path),
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            tick_interval: Duration::from_millis(
                tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
            worker_interval: Duration::from_millis(
                worker_interval_ms.unwrap_or(DEFAULT_WORKER_INTERVAL_MS),
            ),
            collaborator_timeout: Duration::from_millis(
                collaborator_timeout_ms.unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_MS),
            ),
            autosave_interval: Duration::from_secs(
                autosave_interval_seconds.unwrap_or(DEFAULT_AUTOSAVE_INTERVAL_SECONDS),
            ),
            restore_network_on_start: restore_network_on_start.unwrap_or(false),
            network: NetworkSettings::from_raw(raw.network),
            default_cooling_period: Duration::from_secs(
                raw.defaults
                    .cooling_period_minutes
                    .unwrap_or(DEFAULT_COOLING_PERIOD_MINUTES)
                    * 60,
            ),
        }
    }

    /// Path of the JSON block snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILENAME)
    }

    /// Path of the SQLite audit log
    pub fn audit_db_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_DB_FILENAME)
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

/// How the daemon switches connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkBackend {
    /// NetworkManager when available, otherwise `ip link`
    #[default]
    Auto,
    Nmcli,
    Ip,
}

impl FromStr for NetworkBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(NetworkBackend::Auto),
            "nmcli" | "networkmanager" => Ok(NetworkBackend::Nmcli),
            "ip" | "iproute2" => Ok(NetworkBackend::Ip),
            other => Err(format!("unknown network backend: {}", other)),
        }
    }
}

impl fmt::Display for NetworkBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkBackend::Auto => "auto",
            NetworkBackend::Nmcli => "nmcli",
            NetworkBackend::Ip => "ip",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSettings {
    pub backend: NetworkBackend,
    pub interfaces: Vec<String>,
}

impl NetworkSettings {
    fn from_raw(raw: RawNetworkConfig) -> Self {
        Self {
            backend: raw
                .backend
                .and_then(|b| b.parse().ok())
                .unwrap_or_default(),
            interfaces: raw.interfaces,
        }
    }
}
