//! Policy engine — pure function from metrics to a desired replica count.
//!
//! No side effects and deterministic given identical inputs; the
//! reconciler owns all I/O and all mutable state.

use replicore_core::{AutoscaleConfig, DecisionReason, MetricKind, MetricSample, ScaleMode};

/// Output of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub desired: u32,
    pub reason: DecisionReason,
}

/// Decide the desired replica count for one target.
///
/// - Manual mode pins to `manual_replicas`, clamped to bounds; metric
///   samples are ignored entirely.
/// - Auto mode computes `ceil(current * max(observed_avg / target))`
///   over the enabled metrics that have at least one sample, clamped
///   to bounds. An enabled metric with no samples is excluded rather
///   than treated as zero.
/// - Auto mode with nothing observed (or no metrics enabled) holds the
///   current count: never scale blindly.
pub fn decide(
    samples: &[MetricSample],
    config: &AutoscaleConfig,
    current_replicas: u32,
) -> PolicyDecision {
    let clamp = |n: u32| n.clamp(config.min_replicas, config.max_replicas);

    if config.mode == ScaleMode::Manual {
        let pinned = config.manual_replicas.unwrap_or(current_replicas);
        return PolicyDecision {
            desired: clamp(pinned),
            reason: DecisionReason::ManualOverride,
        };
    }

    let Some(max_ratio) = max_observed_ratio(samples, config) else {
        // Fail-safe: no observed metric, hold the line.
        return PolicyDecision {
            desired: clamp(current_replicas),
            reason: DecisionReason::StabilizedNoChange,
        };
    };

    let raw = ((current_replicas as f64) * max_ratio).ceil() as u32;
    let desired = clamp(raw);
    let reason = if desired != raw {
        DecisionReason::BoundsClamped
    } else {
        DecisionReason::MetricsDriven
    };
    PolicyDecision { desired, reason }
}

/// Max of `observed_average / target` over enabled metrics with at
/// least one sample. `None` if nothing was observed.
fn max_observed_ratio(samples: &[MetricSample], config: &AutoscaleConfig) -> Option<f64> {
    let mut max_ratio: Option<f64> = None;

    for kind in MetricKind::ALL {
        let Some(target) = config.targets.target_for(kind) else {
            continue;
        };
        let Some(avg) = average_for(samples, kind) else {
            continue;
        };
        let ratio = avg / target;
        max_ratio = Some(match max_ratio {
            Some(m) if m >= ratio => m,
            _ => ratio,
        });
    }

    max_ratio
}

fn average_for(samples: &[MetricSample], kind: MetricKind) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for s in samples.iter().filter(|s| s.kind == kind) {
        sum += s.value;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicore_core::MetricTargets;

    fn config(min: u32, max: u32, cpu_target: Option<f64>) -> AutoscaleConfig {
        AutoscaleConfig {
            enabled: true,
            mode: ScaleMode::Auto,
            manual_replicas: None,
            min_replicas: min,
            max_replicas: max,
            targets: MetricTargets {
                cpu: cpu_target,
                ..Default::default()
            },
            scale_up_window: "0s".to_string(),
            scale_down_window: "0s".to_string(),
        }
    }

    fn sample(kind: MetricKind, value: f64, ts: u64) -> MetricSample {
        MetricSample {
            kind,
            target_id: "default/api".to_string(),
            value,
            timestamp: ts,
        }
    }

    #[test]
    fn cpu_overload_scales_up_by_ratio() {
        // min=2, max=10, cpu target 50%, current 2, observed 90%:
        // ceil(2 * 1.8) = 4.
        let cfg = config(2, 10, Some(50.0));
        let samples = vec![
            sample(MetricKind::Cpu, 90.0, 1),
            sample(MetricKind::Cpu, 90.0, 2),
            sample(MetricKind::Cpu, 90.0, 3),
        ];
        let d = decide(&samples, &cfg, 2);
        assert_eq!(d.desired, 4);
        assert_eq!(d.reason, DecisionReason::MetricsDriven);
    }

    #[test]
    fn output_is_always_within_bounds() {
        let cfg = config(2, 5, Some(50.0));
        for observed in [0.0, 1.0, 49.0, 50.0, 99.0, 400.0] {
            for current in 1..=8 {
                let samples = vec![sample(MetricKind::Cpu, observed, 1)];
                let d = decide(&samples, &cfg, current);
                assert!(
                    (2..=5).contains(&d.desired),
                    "observed={observed} current={current} desired={}",
                    d.desired
                );
            }
        }
    }

    #[test]
    fn clamped_result_reports_bounds_clamped() {
        let cfg = config(1, 5, Some(10.0));
        // ceil(1 * 100/10) = 10, clamped to 5.
        let d = decide(&[sample(MetricKind::Cpu, 100.0, 1)], &cfg, 1);
        assert_eq!(d.desired, 5);
        assert_eq!(d.reason, DecisionReason::BoundsClamped);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let cfg = config(1, 10, Some(50.0));
        let samples = vec![
            sample(MetricKind::Cpu, 72.0, 1),
            sample(MetricKind::Cpu, 68.0, 2),
        ];
        assert_eq!(decide(&samples, &cfg, 3), decide(&samples, &cfg, 3));
    }

    #[test]
    fn manual_mode_ignores_samples() {
        let mut cfg = config(1, 10, Some(50.0));
        cfg.mode = ScaleMode::Manual;
        cfg.manual_replicas = Some(7);
        // Wildly overloaded CPU must not matter.
        let d = decide(&[sample(MetricKind::Cpu, 500.0, 1)], &cfg, 2);
        assert_eq!(d.desired, 7);
        assert_eq!(d.reason, DecisionReason::ManualOverride);
    }

    #[test]
    fn manual_mode_clamps_to_bounds() {
        let mut cfg = config(2, 6, None);
        cfg.mode = ScaleMode::Manual;
        cfg.manual_replicas = Some(50);
        assert_eq!(decide(&[], &cfg, 3).desired, 6);
        cfg.manual_replicas = Some(1);
        assert_eq!(decide(&[], &cfg, 3).desired, 2);
    }

    #[test]
    fn no_enabled_metrics_holds_current() {
        let cfg = config(1, 10, None);
        for value in [0.0, 50.0, 1000.0] {
            let d = decide(&[sample(MetricKind::Cpu, value, 1)], &cfg, 4);
            assert_eq!(d.desired, 4);
            assert_eq!(d.reason, DecisionReason::StabilizedNoChange);
        }
    }

    #[test]
    fn enabled_metric_without_samples_is_excluded() {
        let mut cfg = config(1, 10, Some(50.0));
        cfg.targets.memory = Some(80.0);
        // Only memory observed; cpu must not contribute a phantom ratio.
        let samples = vec![sample(MetricKind::Memory, 40.0, 1)];
        // ratio = 40/80 = 0.5, ceil(4 * 0.5) = 2.
        assert_eq!(decide(&samples, &cfg, 4).desired, 2);
    }

    #[test]
    fn nothing_observed_in_auto_holds_current() {
        let cfg = config(1, 10, Some(50.0));
        let d = decide(&[], &cfg, 3);
        assert_eq!(d.desired, 3);
        assert_eq!(d.reason, DecisionReason::StabilizedNoChange);
    }

    #[test]
    fn max_ratio_across_metrics_wins() {
        let mut cfg = config(1, 20, Some(50.0));
        cfg.targets.memory = Some(50.0);
        // cpu at target (ratio 1.0), memory at 2x target (ratio 2.0).
        let samples = vec![
            sample(MetricKind::Cpu, 50.0, 1),
            sample(MetricKind::Memory, 100.0, 1),
        ];
        // The overloaded resource drives: ceil(3 * 2.0) = 6.
        assert_eq!(decide(&samples, &cfg, 3).desired, 6);
    }

    #[test]
    fn below_target_proposes_scale_down() {
        let cfg = config(1, 10, Some(50.0));
        // ratio = 10/50 = 0.2, ceil(5 * 0.2) = 1.
        let d = decide(&[sample(MetricKind::Cpu, 10.0, 1)], &cfg, 5);
        assert_eq!(d.desired, 1);
    }
}
