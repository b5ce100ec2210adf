//! Target registry — shared view of managed targets.
//!
//! The registry holds each target's spec, its runtime status, and any
//! staged config write. Config writes are validated on entry and only
//! become live when the target's reconciler task picks them up at the
//! start of a tick — never mid-tick. `current_replicas` is mutated
//! only through `record_applied`, called by the single reconciler task
//! owning that target.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use replicore_core::{
    AutoscaleConfig, ConfigError, ConfigResult, ScalingDecision, TargetSpec, TargetStatus,
    validate_config,
};

struct TargetEntry {
    spec: TargetSpec,
    status: TargetStatus,
    /// Config write waiting for the next tick boundary.
    pending_config: Option<AutoscaleConfig>,
}

/// Shared registry of managed targets and the recent-decision log.
#[derive(Clone)]
pub struct TargetRegistry {
    targets: Arc<RwLock<HashMap<String, TargetEntry>>>,
    decisions: Arc<RwLock<VecDeque<ScalingDecision>>>,
    decision_log_cap: usize,
}

impl TargetRegistry {
    pub fn new(decision_log_cap: usize) -> Self {
        Self {
            targets: Arc::new(RwLock::new(HashMap::new())),
            decisions: Arc::new(RwLock::new(VecDeque::new())),
            decision_log_cap,
        }
    }

    /// Register (or replace) a target.
    ///
    /// The config is validated first; `initial_replicas` is clamped
    /// into the configured bounds so the `min ≤ current ≤ max`
    /// invariant holds from the start. Re-registering keeps the
    /// existing runtime status.
    pub async fn register(&self, spec: TargetSpec, initial_replicas: u32) -> ConfigResult<()> {
        validate_config(&spec.autoscale)?;
        let key = spec.key();
        let clamped =
            initial_replicas.clamp(spec.autoscale.min_replicas, spec.autoscale.max_replicas);

        let mut targets = self.targets.write().await;
        match targets.get_mut(&key) {
            Some(entry) => {
                entry.spec = spec;
            }
            None => {
                targets.insert(
                    key.clone(),
                    TargetEntry {
                        spec,
                        status: TargetStatus {
                            current_replicas: clamped,
                            last_scaled_at: 0,
                        },
                        pending_config: None,
                    },
                );
            }
        }
        info!(%key, replicas = clamped, "target registered");
        Ok(())
    }

    /// Remove a target. Its reconciler task notices on its next tick.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.targets.write().await.remove(key).is_some();
        if removed {
            info!(%key, "target removed");
        }
        removed
    }

    pub async fn keys(&self) -> Vec<String> {
        self.targets.read().await.keys().cloned().collect()
    }

    /// Snapshot one target's spec and status.
    pub async fn snapshot(&self, key: &str) -> Option<(TargetSpec, TargetStatus)> {
        self.targets
            .read()
            .await
            .get(key)
            .map(|e| (e.spec.clone(), e.status))
    }

    /// Snapshot all targets.
    pub async fn list(&self) -> Vec<(TargetSpec, TargetStatus)> {
        self.targets
            .read()
            .await
            .values()
            .map(|e| (e.spec.clone(), e.status))
            .collect()
    }

    /// Stage a config write for a target; takes effect on its next
    /// tick. Validation failures are rejected here, so the policy
    /// engine never sees an invalid config.
    pub async fn stage_config(&self, key: &str, config: AutoscaleConfig) -> ConfigResult<bool> {
        validate_config(&config)?;
        let mut targets = self.targets.write().await;
        let Some(entry) = targets.get_mut(key) else {
            return Ok(false);
        };
        entry.pending_config = Some(config);
        debug!(%key, "autoscale config staged");
        Ok(true)
    }

    /// Apply a staged config write, if any. Called by the owning
    /// reconciler task at the start of a tick. Returns the old and new
    /// configs when a write was applied.
    pub async fn apply_pending(
        &self,
        key: &str,
        now: u64,
    ) -> Option<(AutoscaleConfig, AutoscaleConfig)> {
        let mut targets = self.targets.write().await;
        let entry = targets.get_mut(key)?;
        let new = entry.pending_config.take()?;
        let old = std::mem::replace(&mut entry.spec.autoscale, new.clone());
        entry.spec.updated_at = now;
        info!(%key, "autoscale config applied");
        Some((old, new))
    }

    /// Record a successful apply. Only the reconciler task owning the
    /// target calls this.
    pub async fn record_applied(&self, key: &str, replicas: u32, now: u64) {
        let mut targets = self.targets.write().await;
        if let Some(entry) = targets.get_mut(key) {
            entry.status.current_replicas = replicas;
            entry.status.last_scaled_at = now;
        }
    }

    /// Append to the bounded decision log.
    pub async fn record_decision(&self, decision: ScalingDecision) {
        let mut log = self.decisions.write().await;
        log.push_back(decision);
        while log.len() > self.decision_log_cap {
            log.pop_front();
        }
    }

    /// The most recent decisions, newest first.
    pub async fn recent_decisions(&self, limit: usize) -> Vec<ScalingDecision> {
        let log = self.decisions.read().await;
        log.iter().rev().take(limit).cloned().collect()
    }

    /// Convenience used by the manual-override surface: stage a config
    /// identical to the live one but pinned to `replicas` in manual
    /// mode.
    pub async fn stage_manual_replicas(&self, key: &str, replicas: u32) -> ConfigResult<bool> {
        let Some((spec, _)) = self.snapshot(key).await else {
            return Ok(false);
        };
        let mut config = spec.autoscale.clone();
        config.mode = replicore_core::ScaleMode::Manual;
        config.manual_replicas = Some(replicas);
        if replicas < config.min_replicas || replicas > config.max_replicas {
            return Err(ConfigError::ManualOutOfBounds {
                replicas,
                min: config.min_replicas,
                max: config.max_replicas,
            });
        }
        self.stage_config(key, config).await
    }
}
