//! Configuration validation

use crate::schema::RawConfig;
use crate::settings::NetworkBackend;
use thiserror::Error;

/// Longest accepted reconciler tick
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Longest accepted cooling period (24 hours)
pub const MAX_COOLING_PERIOD_MINUTES: u64 = 1440;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidInterval { field: &'static str, message: String },

    #[error("Unknown network backend '{0}' (expected auto, nmcli or ip)")]
    UnknownBackend(String),

    #[error("Invalid interface name '{0}'")]
    InvalidInterface(String),

    #[error("Cooling period of {minutes} minutes exceeds the maximum of {max} minutes")]
    CoolingPeriodTooLong { minutes: u64, max: u64 },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let daemon = &config.daemon;

    for (field, value) in [
        ("daemon.tick_interval_ms", daemon.tick_interval_ms),
        ("daemon.worker_interval_ms", daemon.worker_interval_ms),
        ("daemon.collaborator_timeout_ms", daemon.collaborator_timeout_ms),
        (
            "daemon.autosave_interval_seconds",
            daemon.autosave_interval_seconds,
        ),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::InvalidInterval {
                field,
                message: "must be greater than zero".into(),
            });
        }
    }

    if let Some(tick) = daemon.tick_interval_ms
        && tick > MAX_TICK_INTERVAL_MS
    {
        errors.push(ValidationError::InvalidInterval {
            field: "daemon.tick_interval_ms",
            message: format!("must be at most {} ms", MAX_TICK_INTERVAL_MS),
        });
    }

    let tick = daemon
        .tick_interval_ms
        .unwrap_or(crate::DEFAULT_TICK_INTERVAL_MS);
    if let Some(worker) = daemon.worker_interval_ms
        && worker > tick
    {
        errors.push(ValidationError::InvalidInterval {
            field: "daemon.worker_interval_ms",
            message: format!("must not exceed the tick interval ({} ms)", tick),
        });
    }

    if let Some(backend) = &config.network.backend
        && backend.parse::<NetworkBackend>().is_err()
    {
        errors.push(ValidationError::UnknownBackend(backend.clone()));
    }

    for iface in &config.network.interfaces {
        if !is_valid_interface_name(iface) {
            errors.push(ValidationError::InvalidInterface(iface.clone()));
        }
    }

    if let Some(minutes) = config.defaults.cooling_period_minutes
        && minutes > MAX_COOLING_PERIOD_MINUTES
    {
        errors.push(ValidationError::CoolingPeriodTooLong {
            minutes,
            max: MAX_COOLING_PERIOD_MINUTES,
        });
    }

    errors
}

/// Linux interface names: 1-15 bytes, no slash or whitespace
fn is_valid_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 15
        && !name.contains('/')
        && !name.chars().any(char::is_whitespace)
        && name != "."
        && name != ".."
}
