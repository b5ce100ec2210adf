//! replicore-core — shared domain types for the Replicore control plane.
//!
//! Defines the scalable `TargetSpec`, its `AutoscaleConfig`, the
//! `MetricSample` observations the policy engine consumes, and the
//! `ScalingDecision` records the reconciler produces. Config validation
//! lives here so an invalid config is rejected at write time and never
//! reaches the policy engine.
//!
//! All types are serde-serializable; targets use `{namespace}/{name}`
//! composite keys.

pub mod config;
pub mod error;
pub mod types;

pub use config::{parse_window, validate_config};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
