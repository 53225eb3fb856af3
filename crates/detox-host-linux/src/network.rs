//! Linux network switching
//!
//! Two tools are supported:
//! - NetworkManager (`nmcli networking on|off`)
//! - iproute2 (`ip link set <iface> up|down`) for hosts without NetworkManager

use async_trait::async_trait;
use detox_host_api::{NetworkController, NetworkError, NetworkResult};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Tool used to switch connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTool {
    Nmcli,
    Ip,
}

impl NetworkTool {
    /// Prefer NetworkManager when its daemon answers
    pub async fn detect() -> Option<Self> {
        if Self::is_nmcli_available().await {
            info!("Detected NetworkManager network backend");
            return Some(Self::Nmcli);
        }

        if Self::is_ip_available().await {
            info!("Detected iproute2 network backend");
            return Some(Self::Ip);
        }

        warn!("No network backend detected");
        None
    }

    async fn is_nmcli_available() -> bool {
        Command::new("nmcli")
            .args(["-t", "general", "status"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn is_ip_available() -> bool {
        Command::new("ip")
            .args(["-o", "link", "show"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nmcli => "nmcli",
            Self::Ip => "ip",
        }
    }
}

/// Network controller shelling out to `nmcli` or `ip`
#[derive(Debug, Clone)]
pub struct LinuxNetworkController {
    tool: Option<NetworkTool>,
    /// Interfaces for `ip link`; empty means every non-loopback interface
    interfaces: Vec<String>,
}

impl LinuxNetworkController {
    pub fn nmcli() -> Self {
        Self {
            tool: Some(NetworkTool::Nmcli),
            interfaces: Vec::new(),
        }
    }

    pub fn ip(interfaces: Vec<String>) -> Self {
        Self {
            tool: Some(NetworkTool::Ip),
            interfaces,
        }
    }

    /// Pick a tool at startup; `interfaces` applies if `ip` is chosen
    pub async fn detect(interfaces: Vec<String>) -> Self {
        Self {
            tool: NetworkTool::detect().await,
            interfaces,
        }
    }

    pub fn tool(&self) -> Option<NetworkTool> {
        self.tool
    }

    async fn set_nmcli(&self, enabled: bool) -> NetworkResult<()> {
        let state = if enabled { "on" } else { "off" };
        run("nmcli", &["networking", state]).await
    }

    async fn set_ip(&self, enabled: bool) -> NetworkResult<()> {
        let interfaces = if self.interfaces.is_empty() {
            list_interfaces().await?
        } else {
            self.interfaces.clone()
        };

        if interfaces.is_empty() {
            return Err(NetworkError::Unavailable("no network interfaces found".into()));
        }

        let state = if enabled { "up" } else { "down" };
        for iface in &interfaces {
            run("ip", &["link", "set", "dev", iface.as_str(), state]).await?;
        }
        Ok(())
    }
}

/// Non-loopback interfaces known to the kernel
async fn list_interfaces() -> NetworkResult<Vec<String>> {
    let mut entries = tokio::fs::read_dir("/sys/class/net").await?;
    let mut interfaces = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != "lo" && !is_virtual(&entry.path()) {
            interfaces.push(name);
        }
    }
    interfaces.sort();
    Ok(interfaces)
}

/// Virtual interfaces (bridges, veth) have no backing `device` link
fn is_virtual(path: &Path) -> bool {
    !path.join("device").exists()
}

async fn run(program: &str, args: &[&str]) -> NetworkResult<()> {
    let command = format!("{} {}", program, args.join(" "));
    debug!(%command, "Running network command");

    let output = Command::new(program).args(args).output().await?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if is_permission_error(&stderr) {
        return Err(NetworkError::PermissionDenied(format!("{}: {}", command, stderr)));
    }
    Err(NetworkError::CommandFailed {
        command,
        message: stderr,
    })
}

fn is_permission_error(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("not authorized")
        || lower.contains("operation not permitted")
        || lower.contains("permission denied")
        || lower.contains("insufficient privileges")
}

#[async_trait]
impl NetworkController for LinuxNetworkController {
    async fn set_network_enabled(&self, enabled: bool) -> NetworkResult<()> {
        let result = match self.tool {
            Some(NetworkTool::Nmcli) => self.set_nmcli(enabled).await,
            Some(NetworkTool::Ip) => self.set_ip(enabled).await,
            None => Err(NetworkError::Unavailable(
                "neither nmcli nor ip is usable".into(),
            )),
        };

        if result.is_ok() {
            info!(enabled, tool = ?self.tool, "Network switched");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_recognised() {
        assert!(is_permission_error(
            "Error: org.freedesktop.NetworkManager.network-control request failed: not authorized"
        ));
        assert!(is_permission_error("RTNETLINK answers: Operation not permitted"));
        assert!(!is_permission_error("Cannot find device \"eth9\""));
    }

    #[tokio::test]
    async fn missing_tool_is_unavailable() {
        let controller = LinuxNetworkController {
            tool: None,
            interfaces: Vec::new(),
        };
        assert!(matches!(
            controller.set_network_enabled(false).await,
            Err(NetworkError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        assert!(matches!(
            run("detox-no-such-binary", &["x"]).await,
            Err(NetworkError::Io(_))
        ));
    }

    #[test]
    fn constructors_pick_tool() {
        assert_eq!(LinuxNetworkController::nmcli().tool(), Some(NetworkTool::Nmcli));
        let ip = LinuxNetworkController::ip(vec!["wlan0".into()]);
        assert_eq!(ip.tool(), Some(NetworkTool::Ip));
        assert_eq!(NetworkTool::Ip.name(), "ip");
    }
}
