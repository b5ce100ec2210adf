//! Autoscale config validation and cooldown window parsing.
//!
//! Validation runs at config-write time (the API surface), so the
//! policy engine and stabilization window only ever see well-formed
//! configs.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{AutoscaleConfig, MetricKind, ScaleMode};

/// Parse a cooldown window string like "30s", "5m", or "1h".
///
/// A bare number is rejected; the unit suffix is required.
pub fn parse_window(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidWindow(s.to_string());

    let (digits, factor) = if let Some(d) = s.strip_suffix('s') {
        (d, 1)
    } else if let Some(d) = s.strip_suffix('m') {
        (d, 60)
    } else if let Some(d) = s.strip_suffix('h') {
        (d, 3600)
    } else {
        return Err(invalid());
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = value.checked_mul(factor).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

/// Validate an `AutoscaleConfig` before it is accepted.
///
/// Rejects `min > max`, `min == 0`, non-positive metric targets,
/// utilization targets above 100%, malformed cooldown windows, and
/// manual mode without a manual replica count.
pub fn validate_config(config: &AutoscaleConfig) -> ConfigResult<()> {
    if config.min_replicas == 0 {
        return Err(ConfigError::MinZero);
    }
    if config.min_replicas > config.max_replicas {
        return Err(ConfigError::MinAboveMax {
            min: config.min_replicas,
            max: config.max_replicas,
        });
    }
    if config.mode == ScaleMode::Manual && config.manual_replicas.is_none() {
        return Err(ConfigError::MissingManualReplicas);
    }

    for kind in MetricKind::ALL {
        let Some(target) = config.targets.target_for(kind) else {
            continue;
        };
        if target <= 0.0 || !target.is_finite() {
            return Err(ConfigError::NonPositiveTarget {
                metric: kind.to_string(),
                value: target,
            });
        }
        // Utilization metrics are percentages; request rate is absolute.
        if kind != MetricKind::RequestRate && target > 100.0 {
            return Err(ConfigError::TargetAboveFullUtilization {
                metric: kind.to_string(),
                value: target,
            });
        }
    }

    parse_window(&config.scale_up_window)?;
    parse_window(&config.scale_down_window)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricTargets;

    fn valid_config() -> AutoscaleConfig {
        AutoscaleConfig {
            enabled: true,
            mode: ScaleMode::Auto,
            manual_replicas: None,
            min_replicas: 2,
            max_replicas: 10,
            targets: MetricTargets {
                cpu: Some(50.0),
                ..Default::default()
            },
            scale_up_window: "30s".to_string(),
            scale_down_window: "5m".to_string(),
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(validate_config(&valid_config()), Ok(()));
    }

    #[test]
    fn rejects_zero_min() {
        let mut c = valid_config();
        c.min_replicas = 0;
        assert_eq!(validate_config(&c), Err(ConfigError::MinZero));
    }

    #[test]
    fn rejects_min_above_max() {
        let mut c = valid_config();
        c.min_replicas = 11;
        assert_eq!(
            validate_config(&c),
            Err(ConfigError::MinAboveMax { min: 11, max: 10 })
        );
    }

    #[test]
    fn rejects_negative_target() {
        let mut c = valid_config();
        c.targets.cpu = Some(-5.0);
        assert!(matches!(
            validate_config(&c),
            Err(ConfigError::NonPositiveTarget { .. })
        ));
    }

    #[test]
    fn rejects_utilization_above_100() {
        let mut c = valid_config();
        c.targets.memory = Some(150.0);
        assert!(matches!(
            validate_config(&c),
            Err(ConfigError::TargetAboveFullUtilization { .. })
        ));
    }

    #[test]
    fn request_rate_target_may_exceed_100() {
        let mut c = valid_config();
        c.targets.request_rate = Some(500.0);
        assert_eq!(validate_config(&c), Ok(()));
    }

    #[test]
    fn rejects_manual_mode_without_count() {
        let mut c = valid_config();
        c.mode = ScaleMode::Manual;
        assert_eq!(
            validate_config(&c),
            Err(ConfigError::MissingManualReplicas)
        );
    }

    #[test]
    fn parse_window_values() {
        assert_eq!(parse_window("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_window("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_window("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_window("0s").unwrap(), Duration::ZERO);
        assert!(parse_window("30").is_err());
        assert!(parse_window("fast").is_err());
        assert!(parse_window("-5s").is_err());
    }

    #[test]
    fn parse_window_rejects_overflowing_value() {
        // Would overflow u64 seconds; must reject, not panic.
        assert_eq!(
            parse_window("9999999999999999999h"),
            Err(ConfigError::InvalidWindow("9999999999999999999h".to_string()))
        );
    }
}
