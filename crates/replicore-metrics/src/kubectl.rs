//! `kubectl top`-backed metrics source.
//!
//! Shells out to `kubectl top pod` for the target's label selector and
//! converts the reported usage quantities into utilization percent
//! against the target's configured per-pod limits. A missing limit
//! excludes that metric from the result rather than failing the fetch.

use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use replicore_core::{MetricKind, MetricSample, TargetSpec};

use crate::source::{BoxFuture, MetricsError, MetricsResult, MetricsSource};

/// Metrics source that polls `kubectl top pod`.
#[derive(Clone)]
pub struct KubectlTopSource {
    kubectl_path: String,
    timeout: Duration,
}

impl KubectlTopSource {
    pub fn new(kubectl_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            timeout,
        }
    }

    async fn fetch_inner(&self, target: &TargetSpec) -> MetricsResult<Vec<MetricSample>> {
        let selector = format!("app={}", target.name);
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.kubectl_path)
                .args([
                    "top",
                    "pod",
                    "-n",
                    &target.namespace,
                    "-l",
                    &selector,
                    "--no-headers",
                ])
                .output(),
        )
        .await
        .map_err(|_| MetricsError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MetricsError::Command(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let samples = samples_from_top_output(&stdout, target, epoch_secs())?;
        debug!(
            target = %target.id,
            samples = samples.len(),
            "fetched kubectl top metrics"
        );
        Ok(samples)
    }
}

impl MetricsSource for KubectlTopSource {
    fn fetch(&self, target: &TargetSpec) -> BoxFuture<MetricsResult<Vec<MetricSample>>> {
        let source = self.clone();
        let target = target.clone();
        Box::pin(async move { source.fetch_inner(&target).await })
    }
}

/// Convert `kubectl top pod --no-headers` output into utilization
/// samples, averaged across the target's pods.
///
/// Expected line format: `{pod-name}  {cpu}  {memory}`, e.g.
/// `api-7c9d-xk2lp  250m  128Mi`.
fn samples_from_top_output(
    output: &str,
    target: &TargetSpec,
    now: u64,
) -> MetricsResult<Vec<MetricSample>> {
    let mut cpu_percents = Vec::new();
    let mut memory_percents = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = line.split_whitespace();
        let _pod = fields.next();
        let (Some(cpu), Some(memory)) = (fields.next(), fields.next()) else {
            return Err(MetricsError::Parse(format!("malformed line: {line:?}")));
        };

        if target.resources.cpu_limit_millis > 0
            && let Some(millis) = cpu_millis(cpu)
        {
            cpu_percents
                .push(millis as f64 / target.resources.cpu_limit_millis as f64 * 100.0);
        }
        if target.resources.memory_limit_bytes > 0
            && let Some(bytes) = memory_bytes(memory)
        {
            memory_percents
                .push(bytes as f64 / target.resources.memory_limit_bytes as f64 * 100.0);
        }
    }

    let mut samples = Vec::new();
    if let Some(avg) = average(&cpu_percents) {
        samples.push(MetricSample {
            kind: MetricKind::Cpu,
            target_id: target.id.clone(),
            value: avg,
            timestamp: now,
        });
    }
    if let Some(avg) = average(&memory_percents) {
        samples.push(MetricSample {
            kind: MetricKind::Memory,
            target_id: target.id.clone(),
            value: avg,
            timestamp: now,
        });
    }
    Ok(samples)
}

fn average(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

static QUANTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([a-zA-Z]*)$").expect("static quantity pattern"));

/// Split a resource quantity like `250m` or `128Mi` into value + unit.
fn parse_quantity(s: &str) -> Option<(u64, String)> {
    let caps = QUANTITY_RE.captures(s.trim())?;
    let value = caps.get(1)?.as_str().parse::<u64>().ok()?;
    let unit = caps.get(2).map_or("", |m| m.as_str()).to_string();
    Some((value, unit))
}

/// CPU quantity to millicores (`250m` → 250, `2` → 2000).
fn cpu_millis(s: &str) -> Option<u64> {
    let (value, unit) = parse_quantity(s)?;
    match unit.as_str() {
        "m" => Some(value),
        "" => value.checked_mul(1000),
        _ => None,
    }
}

/// Memory quantity to bytes (`128Mi` → 134217728). Quantities that
/// overflow u64 bytes are treated as unparseable.
fn memory_bytes(s: &str) -> Option<u64> {
    let (value, unit) = parse_quantity(s)?;
    let factor: u64 = match unit.as_str() {
        "" => 1,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "K" | "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        _ => return None,
    };
    value.checked_mul(factor)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
