//! Engine errors

use detox_util::{BlockId, TimeParseError};
use std::time::Duration;
use thiserror::Error;

/// Shortest accepted block duration
pub const MIN_BLOCK_DURATION: Duration = Duration::from_secs(60);

/// Longest accepted block duration and cooling period
pub const MAX_BLOCK_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// A request rejected before any registry change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Duration {0:?} is outside the allowed range of 1 minute to 24 hours")]
    DurationOutOfRange(Duration),

    #[error("Cooling period {0:?} exceeds 24 hours")]
    CoolingPeriodTooLong(Duration),

    #[error("Invalid time of day: {0}")]
    InvalidTime(TimeParseError),

    #[error("Invalid day: {0}")]
    InvalidDay(TimeParseError),

    #[error("A routine needs at least one day")]
    NoDays,

    #[error("A routine needs at least one application")]
    NoApps,

    #[error("Application name cannot be empty")]
    EmptyAppName,

    #[error("Unknown routine: {0}")]
    UnknownRoutine(BlockId),
}

/// Errors from engine operations
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Block engine is not running")]
    EngineUnavailable,
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Check a block duration against the allowed range
pub fn validate_block_duration(duration: Duration) -> Result<Duration, ValidationError> {
    if (MIN_BLOCK_DURATION..=MAX_BLOCK_DURATION).contains(&duration) {
        Ok(duration)
    } else {
        Err(ValidationError::DurationOutOfRange(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_duration_bounds() {
        assert!(validate_block_duration(Duration::from_secs(60)).is_ok());
        assert!(validate_block_duration(MAX_BLOCK_DURATION).is_ok());
        assert_eq!(
            validate_block_duration(Duration::ZERO),
            Err(ValidationError::DurationOutOfRange(Duration::ZERO))
        );
        assert!(validate_block_duration(Duration::from_secs(59)).is_err());
        assert!(validate_block_duration(MAX_BLOCK_DURATION + Duration::from_secs(1)).is_err());
    }
}
