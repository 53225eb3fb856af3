//! Config validation CLI tool
//!
//! Checks a detoxd configuration file and prints the effective settings,
//! or every problem found.

use detox_config::{CURRENT_CONFIG_VERSION, ConfigError, DaemonSettings, load_config};
use detox_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn summary(settings: &DaemonSettings) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Config version", CURRENT_CONFIG_VERSION.to_string()),
        ("Socket", settings.socket_path.display().to_string()),
        ("Data dir", settings.data_dir.display().to_string()),
        ("Tick interval", format!("{:?}", settings.tick_interval)),
        ("Worker interval", format!("{:?}", settings.worker_interval)),
        ("Collaborator timeout", format!("{:?}", settings.collaborator_timeout)),
        ("Autosave interval", format!("{:?}", settings.autosave_interval)),
        (
            "Restore network on start",
            settings.restore_network_on_start.to_string(),
        ),
        ("Network backend", settings.network.backend.to_string()),
    ];
    if !settings.network.interfaces.is_empty() {
        rows.push(("Interfaces", settings.network.interfaces.join(", ")));
    }
    rows.push((
        "Default cooling period",
        format!("{} min", settings.default_cooling_period.as_secs() / 60),
    ));
    rows
}

fn report(error: &ConfigError) {
    match error {
        ConfigError::ValidationFailed { errors } => {
            eprintln!("Validation errors ({}):", errors.len());
            for err in errors {
                eprintln!("  - {}", err);
            }
        }
        ConfigError::UnsupportedVersion(found) => {
            eprintln!(
                "Unsupported config version: {} (expected {})",
                found, CURRENT_CONFIG_VERSION
            );
        }
        other => eprintln!("{}", other),
    }
}

fn main() -> ExitCode {
    let Some(config_path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: validate-config <config-file>");
        eprintln!();
        eprintln!("detoxd reads {} by default.", default_config_path().display());
        return ExitCode::from(2);
    };

    match load_config(&config_path) {
        Ok(settings) => {
            println!("✓ {} is valid", config_path.display());
            println!();
            for (label, value) in summary(&settings) {
                println!("  {:<26}{}", format!("{}:", label), value);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {} is not valid", config_path.display());
            eprintln!();
            report(&e);
            ExitCode::from(1)
        }
    }
}
