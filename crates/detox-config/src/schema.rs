//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub daemon: RawDaemonConfig,

    #[serde(default)]
    pub network: RawNetworkConfig,

    #[serde(default)]
    pub defaults: RawDefaults,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            config_version: crate::CURRENT_CONFIG_VERSION,
            daemon: RawDaemonConfig::default(),
            network: RawNetworkConfig::default(),
            defaults: RawDefaults::default(),
        }
    }
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Directory holding the block snapshot and audit log
    pub data_dir: Option<PathBuf>,

    /// Reconciler tick period
    pub tick_interval_ms: Option<u64>,

    /// How often a worker re-terminates its app
    pub worker_interval_ms: Option<u64>,

    /// Upper bound on a single process/network call
    pub collaborator_timeout_ms: Option<u64>,

    pub autosave_interval_seconds: Option<u64>,

    /// Re-enable networking on startup when no internet block is active
    pub restore_network_on_start: Option<bool>,
}

/// Network backend settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNetworkConfig {
    /// `auto`, `nmcli` or `ip`
    pub backend: Option<String>,

    /// Interfaces toggled by the `ip` backend; empty means every
    /// non-loopback interface
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Values used when no snapshot exists yet
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    pub cooling_period_minutes: Option<u64>,
}
