//! Config validation error types.

use thiserror::Error;

/// Result type alias for config validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised when an `AutoscaleConfig` is rejected at write time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("min_replicas must be greater than zero")]
    MinZero,

    #[error("min_replicas ({min}) exceeds max_replicas ({max})")]
    MinAboveMax { min: u32, max: u32 },

    #[error("target for {metric} must be positive, got {value}")]
    NonPositiveTarget { metric: String, value: f64 },

    #[error("utilization target for {metric} must be at most 100, got {value}")]
    TargetAboveFullUtilization { metric: String, value: f64 },

    #[error("manual mode requires manual_replicas")]
    MissingManualReplicas,

    #[error("manual replica count {replicas} outside [{min}, {max}]")]
    ManualOutOfBounds { replicas: u32, min: u32, max: u32 },

    #[error("invalid cooldown window {0:?} (expected e.g. \"30s\" or \"5m\")")]
    InvalidWindow(String),
}
