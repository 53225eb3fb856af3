//! Default locations of the socket, data and config files
//!
//! Everything resolves under the user's XDG directories so the daemon can run
//! unprivileged. `DETOX_SOCKET` and `DETOX_DATA_DIR` take precedence.

use std::env;
use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const DETOX_SOCKET_ENV: &str = "DETOX_SOCKET";

/// Environment variable for overriding the data directory
pub const DETOX_DATA_DIR_ENV: &str = "DETOX_DATA_DIR";

/// Snapshot file name inside the data directory
pub const SNAPSHOT_FILENAME: &str = "blocks.json";

/// Audit database file name inside the data directory
pub const AUDIT_DB_FILENAME: &str = "audit.db";

const APP_DIR: &str = "detoxd";

/// `$<xdg_var>/detoxd`, else `$HOME/<home_relative>/detoxd`
fn xdg_dir(xdg_var: &str, home_relative: &str) -> Option<PathBuf> {
    if let Some(dir) = env::var_os(xdg_var).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join(APP_DIR));
    }
    env::var_os("HOME").map(|home| PathBuf::from(home).join(home_relative).join(APP_DIR))
}

fn env_override(var: &str) -> Option<PathBuf> {
    env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// `$DETOX_SOCKET`, else [`socket_path_without_env`]
pub fn default_socket_path() -> PathBuf {
    env_override(DETOX_SOCKET_ENV).unwrap_or_else(socket_path_without_env)
}

/// `$XDG_RUNTIME_DIR/detoxd/detoxd.sock`, else a per-user directory in `/tmp`
pub fn socket_path_without_env() -> PathBuf {
    let dir = match env::var_os("XDG_RUNTIME_DIR").filter(|v| !v.is_empty()) {
        Some(runtime) => PathBuf::from(runtime).join(APP_DIR),
        None => {
            let user = env::var("USER").unwrap_or_else(|_| "nobody".into());
            PathBuf::from(format!("/tmp/{}-{}", APP_DIR, user))
        }
    };
    dir.join("detoxd.sock")
}

/// `$DETOX_DATA_DIR`, else [`data_dir_without_env`]
pub fn default_data_dir() -> PathBuf {
    env_override(DETOX_DATA_DIR_ENV).unwrap_or_else(data_dir_without_env)
}

/// `$XDG_DATA_HOME/detoxd`, else `~/.local/share/detoxd`
pub fn data_dir_without_env() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}

/// `$XDG_CONFIG_HOME/detoxd/config.toml`, else `~/.config/detoxd/config.toml`
pub fn default_config_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
        .unwrap_or_else(|| PathBuf::from("/etc").join(APP_DIR))
        .join("config.toml")
}
