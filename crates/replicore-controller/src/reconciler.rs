//! Reconciler — the periodic control loop.
//!
//! One worker task per target (single-writer affinity: a target's
//! replica count is only ever mutated by its own task, so decisions
//! for a target are strictly ordered and never race). Each tick walks
//! `Idle → Sampling → Deciding → Applying → Idle`; the terminal
//! `Stopped` is reached on shutdown or when the target disappears from
//! the registry.
//!
//! Failure posture: a failed metrics fetch degrades the tick (stale or
//! empty window, policy holds), a failed apply retains the previous
//! replica count and is retried on a later tick behind an exponential
//! backoff capped at the tick interval. Nothing here terminates the
//! loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use replicore_backend::{BackendError, OrchestrationBackend};
use replicore_core::{DecisionReason, ScalingDecision};
use replicore_events::{ControlEvent, EventBus};
use replicore_metrics::{MetricsSource, SampleWindow};
use replicore_policy::{StabilizationWindow, decide};

use crate::registry::TargetRegistry;

/// Tunables for the control loop.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Interval between ticks for each target.
    pub tick_interval: Duration,
    /// How long metric samples stay in the decision window.
    pub sample_retention: Duration,
    /// Hard cap on retained samples per target.
    pub max_samples: usize,
    /// Whether no-change decisions are logged and published.
    pub log_no_change: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15),
            sample_retention: Duration::from_secs(300),
            max_samples: 240,
            log_no_change: true,
        }
    }
}

/// Where a worker is within its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Sampling,
    Deciding,
    Applying,
    Stopped,
}

/// Outcome of one worker tick.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    /// The target vanished from the registry; the worker winds down.
    TargetGone,
}

/// Exponential backoff for failed applies, capped at the tick interval
/// so retries never outpace the loop and never hammer the backend.
#[derive(Debug)]
struct ApplyBackoff {
    base: Duration,
    cap: Duration,
    delay: Duration,
    retry_at: u64,
}

impl ApplyBackoff {
    fn new(cap: Duration) -> Self {
        let base = Duration::from_secs(1);
        Self {
            base,
            cap: cap.max(base),
            delay: base,
            retry_at: 0,
        }
    }

    fn ready(&self, now: u64) -> bool {
        now >= self.retry_at
    }

    fn note_failure(&mut self, now: u64) {
        self.retry_at = now + self.delay.as_secs();
        self.delay = (self.delay * 2).min(self.cap);
    }

    fn reset(&mut self) {
        self.delay = self.base;
        self.retry_at = 0;
    }
}

/// Per-target reconciliation worker. Owns the sample window, the
/// stabilization state, and the apply backoff for exactly one target.
pub(crate) struct TargetWorker {
    key: String,
    registry: TargetRegistry,
    metrics: Arc<dyn MetricsSource>,
    backend: Arc<dyn OrchestrationBackend>,
    bus: EventBus,
    settings: ReconcilerSettings,
    window: SampleWindow,
    stabilizer: Option<StabilizationWindow>,
    backoff: ApplyBackoff,
    phase: TickPhase,
}

impl TargetWorker {
    pub(crate) fn new(
        key: String,
        registry: TargetRegistry,
        metrics: Arc<dyn MetricsSource>,
        backend: Arc<dyn OrchestrationBackend>,
        bus: EventBus,
        settings: ReconcilerSettings,
    ) -> Self {
        let window = SampleWindow::new(settings.sample_retention, settings.max_samples);
        let backoff = ApplyBackoff::new(settings.tick_interval);
        Self {
            key,
            registry,
            metrics,
            backend,
            bus,
            settings,
            window,
            stabilizer: None,
            backoff,
            phase: TickPhase::Idle,
        }
    }

    /// Run one tick for this target.
    pub(crate) async fn tick(&mut self, now: u64) -> TickOutcome {
        let Some((spec, _)) = self.registry.snapshot(&self.key).await else {
            self.phase = TickPhase::Stopped;
            return TickOutcome::TargetGone;
        };

        // Staged config writes land at the tick boundary, never mid-tick.
        let spec = match self.registry.apply_pending(&self.key, now).await {
            Some((old, new)) => {
                self.stabilizer = StabilizationWindow::from_config(&new).ok();
                if old.enabled != new.enabled || old.mode != new.mode {
                    self.push_policy(&new).await;
                }
                match self.registry.snapshot(&self.key).await {
                    Some((spec, _)) => spec,
                    None => {
                        self.phase = TickPhase::Stopped;
                        return TickOutcome::TargetGone;
                    }
                }
            }
            None => spec,
        };

        if !spec.autoscale.enabled {
            self.phase = TickPhase::Idle;
            return TickOutcome::Continue;
        }

        // ── Sampling ───────────────────────────────────────────────
        self.phase = TickPhase::Sampling;
        let fetch_timeout = self.settings.tick_interval / 2;
        match tokio::time::timeout(fetch_timeout, self.metrics.fetch(&spec)).await {
            Ok(Ok(samples)) => self.window.extend(samples, now),
            Ok(Err(e)) => {
                warn!(target = %self.key, error = %e, "metrics fetch failed; tick degrades");
            }
            Err(_) => {
                warn!(
                    target = %self.key,
                    timeout_secs = fetch_timeout.as_secs(),
                    "metrics fetch timed out; tick degrades"
                );
            }
        }
        self.window.prune(now);

        // ── Deciding ───────────────────────────────────────────────
        self.phase = TickPhase::Deciding;
        let current = match self.registry.snapshot(&self.key).await {
            Some((_, status)) => status.current_replicas,
            None => {
                self.phase = TickPhase::Stopped;
                return TickOutcome::TargetGone;
            }
        };

        let outcome = decide(self.window.samples(), &spec.autoscale, current);
        let final_desired = self
            .stabilizer
            .get_or_insert_with(|| {
                StabilizationWindow::from_config(&spec.autoscale)
                    .unwrap_or_else(|_| StabilizationWindow::new(Duration::ZERO, Duration::ZERO))
            })
            .stabilize(outcome.desired, current, now);

        // ── Applying ───────────────────────────────────────────────
        self.phase = TickPhase::Applying;
        if final_desired == current {
            // Idempotence: never issue no-op scale commands.
            if self.settings.log_no_change {
                self.emit_decision(final_desired, DecisionReason::StabilizedNoChange, now)
                    .await;
            }
            self.phase = TickPhase::Idle;
            return TickOutcome::Continue;
        }

        if !self.backoff.ready(now) {
            debug!(target = %self.key, "apply suppressed by backoff");
            self.phase = TickPhase::Idle;
            return TickOutcome::Continue;
        }

        let apply_timeout = self.settings.tick_interval;
        let result = match tokio::time::timeout(
            apply_timeout,
            self.backend.scale(&spec, final_desired),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(apply_timeout.as_secs())),
        };

        match result {
            Ok(()) => {
                self.registry
                    .record_applied(&self.key, final_desired, now)
                    .await;
                if let Some(stabilizer) = self.stabilizer.as_mut() {
                    if final_desired > current {
                        stabilizer.record_scale_up(now);
                    } else {
                        stabilizer.record_scale_down(now);
                    }
                }
                self.backoff.reset();
                info!(
                    target = %self.key,
                    from = current,
                    to = final_desired,
                    reason = ?outcome.reason,
                    "scaled"
                );
                self.emit_decision(final_desired, outcome.reason, now).await;
            }
            Err(e) => {
                // Hold the previous count; retry on a later tick.
                warn!(
                    target = %self.key,
                    attempted = final_desired,
                    error = %e,
                    "apply failed; holding replicas"
                );
                self.backoff.note_failure(now);
                self.bus.publish(ControlEvent::ApplyFailed {
                    target_id: self.key.clone(),
                    attempted_replicas: final_desired,
                    error: e.to_string(),
                    timestamp: now,
                });
            }
        }

        self.phase = TickPhase::Idle;
        TickOutcome::Continue
    }

    async fn emit_decision(&self, replicas: u32, reason: DecisionReason, now: u64) {
        let decision = ScalingDecision {
            target_id: self.key.clone(),
            desired_replicas: replicas,
            reason,
            timestamp: now,
        };
        self.registry.record_decision(decision.clone()).await;
        self.bus.publish(ControlEvent::from_decision(&decision));
    }

    /// Push an enable/disable or mode change to the backend. Failures
    /// are logged; the next config write retries.
    async fn push_policy(&self, config: &replicore_core::AutoscaleConfig) {
        let Some((mut spec, _)) = self.registry.snapshot(&self.key).await else {
            return;
        };
        spec.autoscale = config.clone();
        if let Err(e) = self.backend.apply_autoscale_policy(&spec, config).await {
            warn!(target = %self.key, error = %e, "autoscale policy push failed");
        }
    }
}

/// Drives one worker until shutdown or target removal.
async fn run_worker(
    mut worker: TargetWorker,
    tick_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick_interval) => {
                if worker.tick(epoch_secs()).await == TickOutcome::TargetGone {
                    info!(target = %worker.key, "worker stopping: target gone");
                    break;
                }
            }
            _ = shutdown.changed() => {
                debug!(target = %worker.key, "worker stopping: shutdown");
                break;
            }
        }
    }
    worker.phase = TickPhase::Stopped;
}

struct WorkerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns all per-target workers and keeps them in sync with the
/// registry. Distinct targets tick on distinct tasks: a slow apply on
/// one target never skews another's timing.
pub struct Reconciler {
    registry: TargetRegistry,
    metrics: Arc<dyn MetricsSource>,
    backend: Arc<dyn OrchestrationBackend>,
    bus: EventBus,
    settings: ReconcilerSettings,
    workers: Arc<RwLock<HashMap<String, WorkerSlot>>>,
}

impl Reconciler {
    pub fn new(
        registry: TargetRegistry,
        metrics: Arc<dyn MetricsSource>,
        backend: Arc<dyn OrchestrationBackend>,
        bus: EventBus,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            registry,
            metrics,
            backend,
            bus,
            settings,
            workers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a worker for a target (replacing any previous worker).
    pub async fn start_target(&self, key: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = TargetWorker::new(
            key.to_string(),
            self.registry.clone(),
            self.metrics.clone(),
            self.backend.clone(),
            self.bus.clone(),
            self.settings.clone(),
        );
        let tick_interval = self.settings.tick_interval;
        let handle = tokio::spawn(run_worker(worker, tick_interval, shutdown_rx));

        let mut workers = self.workers.write().await;
        if let Some(old) = workers.insert(key.to_string(), WorkerSlot { handle, shutdown_tx }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }
        info!(target = %key, "reconciler worker started");
    }

    /// Stop the worker for a target.
    pub async fn stop_target(&self, key: &str) {
        let mut workers = self.workers.write().await;
        if let Some(slot) = workers.remove(key) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(target = %key, "reconciler worker stopped");
        }
    }

    /// Stop all workers (graceful shutdown).
    pub async fn stop_all(&self) {
        let mut workers = self.workers.write().await;
        for (key, slot) in workers.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(target = %key, "reconciler worker stopped");
        }
    }

    /// Start workers for registry targets that lack one and reap
    /// workers whose task already finished (target removed).
    pub async fn sync_targets(&self) -> anyhow::Result<()> {
        let keys = self.registry.keys().await;

        {
            let mut workers = self.workers.write().await;
            workers.retain(|_, slot| !slot.handle.is_finished());
        }

        for key in keys {
            let running = self.workers.read().await.contains_key(&key);
            if !running {
                self.start_target(&key).await;
            }
        }
        Ok(())
    }

    /// Run the reconciler until the shutdown signal fires: keeps the
    /// worker set in sync with the registry, then winds everything
    /// down. No new ticks are scheduled after shutdown; in-flight
    /// applies finish at the backend adapter's discretion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.settings.tick_interval.as_secs(),
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.tick_interval) => {
                    if let Err(e) = self.sync_targets().await {
                        tracing::error!(error = %e, "reconciler target sync failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    self.stop_all().await;
                    break;
                }
            }
        }
    }

    /// Number of live workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
