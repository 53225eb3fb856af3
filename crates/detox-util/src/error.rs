//! Parse errors for user-supplied schedule values

use thiserror::Error;

/// Error produced when a time-of-day or weekday string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("Invalid time '{value}': expected HH:MM")]
    Format { value: String },

    #[error("Invalid time '{value}': hour must be 0-23")]
    Hour { value: String },

    #[error("Invalid time '{value}': minute must be 0-59")]
    Minute { value: String },

    #[error("Unknown day: {0}")]
    UnknownDay(String),

    #[error("Unknown day preset: {0}")]
    UnknownPreset(String),
}
