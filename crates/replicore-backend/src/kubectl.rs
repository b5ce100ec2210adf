//! kubectl-backed orchestration adapter.
//!
//! Issues `kubectl scale deployment` for replica changes and
//! `kubectl autoscale` / `kubectl delete hpa` for policy toggles.
//! Every invocation is bounded by the configured timeout; a timed-out
//! command is reported as `BackendError::Timeout` and the child
//! process is killed when the future drops.

use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use replicore_core::{AutoscaleConfig, ScaleMode, TargetSpec};

use crate::{BackendError, BackendResult, BoxFuture, OrchestrationBackend};

/// Orchestration backend that shells out to `kubectl`.
#[derive(Clone)]
pub struct KubectlBackend {
    kubectl_path: String,
    timeout: Duration,
}

impl KubectlBackend {
    pub fn new(kubectl_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            timeout,
        }
    }

    /// Run one kubectl invocation and classify the outcome.
    async fn run(&self, args: Vec<String>) -> BackendResult<()> {
        // kill_on_drop: a timed-out kubectl must not linger.
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.kubectl_path)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.timeout.as_secs()))?;

        let output = result.map_err(|e| BackendError::Unreachable(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Rejected(stderr.trim().to_string()));
        }
        debug!(?args, "kubectl apply succeeded");
        Ok(())
    }
}

impl OrchestrationBackend for KubectlBackend {
    fn scale(&self, target: &TargetSpec, replicas: u32) -> BoxFuture<BackendResult<()>> {
        let backend = self.clone();
        let args = vec![
            "scale".to_string(),
            "deployment".to_string(),
            target.name.clone(),
            "-n".to_string(),
            target.namespace.clone(),
            format!("--replicas={replicas}"),
        ];
        Box::pin(async move { backend.run(args).await })
    }

    fn apply_autoscale_policy(
        &self,
        target: &TargetSpec,
        config: &AutoscaleConfig,
    ) -> BoxFuture<BackendResult<()>> {
        let backend = self.clone();
        let args = if config.enabled && config.mode == ScaleMode::Auto {
            let mut args = vec![
                "autoscale".to_string(),
                "deployment".to_string(),
                target.name.clone(),
                "-n".to_string(),
                target.namespace.clone(),
                format!("--min={}", config.min_replicas),
                format!("--max={}", config.max_replicas),
            ];
            if let Some(cpu) = config.targets.cpu {
                args.push(format!("--cpu-percent={}", cpu as u32));
            }
            args
        } else {
            vec![
                "delete".to_string(),
                "hpa".to_string(),
                target.name.clone(),
                "-n".to_string(),
                target.namespace.clone(),
                "--ignore-not-found".to_string(),
            ]
        };
        Box::pin(async move { backend.run(args).await })
    }
}
