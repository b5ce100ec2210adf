//! Domain types for the Replicore control plane.
//!
//! These types describe the scalable targets under autoscaler control,
//! the metric observations fed to the policy engine, and the scaling
//! decisions the reconciler emits. All types serialize to/from JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a target (namespace-scoped).
pub type TargetId = String;

// ── Target ─────────────────────────────────────────────────────────

/// Specification for a scalable workload target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSpec {
    pub id: TargetId,
    pub namespace: String,
    pub name: String,
    /// Per-pod resource limits, used to convert raw usage into percent.
    pub resources: PodResources,
    /// Autoscaling configuration for this target.
    pub autoscale: AutoscaleConfig,
    /// Unix timestamp (seconds) when this spec was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this spec was last updated.
    pub updated_at: u64,
}

impl TargetSpec {
    /// Build the composite key for this target.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Per-pod resource limits for a target's workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PodResources {
    /// CPU limit in millicores.
    pub cpu_limit_millis: u64,
    /// Memory limit in bytes.
    pub memory_limit_bytes: u64,
}

/// Mutable runtime status of a target.
///
/// Mutated only by the reconciler task owning the target, after a
/// successful apply. Everyone else reads snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetStatus {
    /// Current replica count as last applied (or observed at startup).
    pub current_replicas: u32,
    /// Unix timestamp of the last successful apply, 0 if never.
    pub last_scaled_at: u64,
}

// ── Autoscale configuration ────────────────────────────────────────

/// Scaling mode for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Replica count pinned to `manual_replicas` (clamped to bounds).
    Manual,
    /// Replica count driven by metric ratios.
    Auto,
}

/// Autoscaling parameters for one target.
///
/// Read-mostly input to the controller; writes are staged and take
/// effect on the next tick, never mid-tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoscaleConfig {
    /// Whether the controller acts on this target at all.
    pub enabled: bool,
    pub mode: ScaleMode,
    /// Desired replica count in manual mode.
    pub manual_replicas: Option<u32>,
    /// Minimum replica count (must be > 0).
    pub min_replicas: u32,
    /// Maximum replica count.
    pub max_replicas: u32,
    /// Per-metric targets; a present entry means the metric is enabled.
    pub targets: MetricTargets,
    /// Cooldown before another scale-up (e.g., "30s").
    pub scale_up_window: String,
    /// Cooldown before a scale-down (e.g., "5m"), typically longer.
    pub scale_down_window: String,
}

/// Per-metric target values. `cpu` and `memory` are utilization
/// percent (0–100); `request_rate` is an absolute per-replica rate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricTargets {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub request_rate: Option<f64>,
}

impl MetricTargets {
    /// Target value for a metric kind, if that metric is enabled.
    pub fn target_for(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            MetricKind::RequestRate => self.request_rate,
        }
    }

    /// True if no metric is enabled.
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.request_rate.is_none()
    }

    /// The metric kinds enabled in this config.
    pub fn enabled_kinds(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .iter()
            .copied()
            .filter(|k| self.target_for(*k).is_some())
            .collect()
    }
}

// ── Metrics ────────────────────────────────────────────────────────

/// Kinds of metrics a target can scale on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    RequestRate,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] =
        [MetricKind::Cpu, MetricKind::Memory, MetricKind::RequestRate];
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Cpu => write!(f, "cpu"),
            MetricKind::Memory => write!(f, "memory"),
            MetricKind::RequestRate => write!(f, "request_rate"),
        }
    }
}

/// One metric observation for a target. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub target_id: TargetId,
    pub value: f64,
    /// Unix timestamp (seconds) of the observation.
    pub timestamp: u64,
}

// ── Decisions ──────────────────────────────────────────────────────

/// Why a scaling decision landed on its replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Metric ratios drove the count.
    MetricsDriven,
    /// The raw desired count was clamped to the min/max bounds.
    BoundsClamped,
    /// Stabilization (or an already-correct count) held the line.
    StabilizedNoChange,
    /// Manual mode pinned the count.
    ManualOverride,
}

/// One scaling decision, produced once per reconciler tick per target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingDecision {
    pub target_id: TargetId,
    pub desired_replicas: u32,
    pub reason: DecisionReason,
    /// Unix timestamp (seconds) when the decision was made.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_key_is_namespace_scoped() {
        let spec = TargetSpec {
            id: "default/api".to_string(),
            namespace: "default".to_string(),
            name: "api".to_string(),
            resources: PodResources {
                cpu_limit_millis: 500,
                memory_limit_bytes: 256 * 1024 * 1024,
            },
            autoscale: AutoscaleConfig {
                enabled: true,
                mode: ScaleMode::Auto,
                manual_replicas: None,
                min_replicas: 1,
                max_replicas: 10,
                targets: MetricTargets {
                    cpu: Some(50.0),
                    ..Default::default()
                },
                scale_up_window: "30s".to_string(),
                scale_down_window: "5m".to_string(),
            },
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(spec.key(), "default/api");
    }

    #[test]
    fn enabled_kinds_tracks_present_targets() {
        let targets = MetricTargets {
            cpu: Some(50.0),
            memory: None,
            request_rate: Some(100.0),
        };
        assert_eq!(
            targets.enabled_kinds(),
            vec![MetricKind::Cpu, MetricKind::RequestRate]
        );
        assert!(!targets.is_empty());
        assert!(MetricTargets::default().is_empty());
    }

    #[test]
    fn decision_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DecisionReason::StabilizedNoChange).unwrap();
        assert_eq!(json, "\"stabilized_no_change\"");
    }
}
