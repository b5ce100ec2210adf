//! Stabilization window — cooldown and hysteresis over raw decisions.
//!
//! Scale-ups and scale-downs are gated asymmetrically: a scale-up
//! passes as soon as the (short) up-cooldown allows, while a
//! scale-down requires the raw desired count to have stayed below the
//! current count continuously for the entire (longer) down-cooldown.
//! Fast up, slow down is the standard mitigation for load spikes vs.
//! noisy idle periods.

use std::collections::VecDeque;
use std::time::Duration;

use replicore_core::{AutoscaleConfig, ConfigResult, parse_window};

/// Bound on the retained raw-decision ring.
const MAX_HISTORY: usize = 256;

/// One raw policy output, recorded per tick.
#[derive(Debug, Clone, Copy)]
struct RawDecision {
    desired: u32,
    timestamp: u64,
}

/// Per-target stabilization state.
///
/// Owned by the reconciler task for its target; cooldown bookkeeping
/// is only advanced via [`record_scale_up`]/[`record_scale_down`]
/// after a successful apply, so a failed apply never burns a cooldown.
///
/// [`record_scale_up`]: StabilizationWindow::record_scale_up
/// [`record_scale_down`]: StabilizationWindow::record_scale_down
#[derive(Debug)]
pub struct StabilizationWindow {
    scale_up_cooldown: Duration,
    scale_down_cooldown: Duration,
    /// Bounded ring of recent raw decisions, newest at the back.
    history: VecDeque<RawDecision>,
    /// Timestamp of the last applied scale-up, if any.
    last_scale_up: Option<u64>,
    /// Timestamp of the last applied scale-down, if any.
    last_scale_down: Option<u64>,
}

impl StabilizationWindow {
    pub fn new(scale_up_cooldown: Duration, scale_down_cooldown: Duration) -> Self {
        Self {
            scale_up_cooldown,
            scale_down_cooldown,
            history: VecDeque::new(),
            last_scale_up: None,
            last_scale_down: None,
        }
    }

    /// Build from a validated config's cooldown window strings.
    pub fn from_config(config: &AutoscaleConfig) -> ConfigResult<Self> {
        Ok(Self::new(
            parse_window(&config.scale_up_window)?,
            parse_window(&config.scale_down_window)?,
        ))
    }

    /// Smooth a raw desired count into the final desired count.
    ///
    /// Records `raw_desired` into the ring, then:
    /// - `raw > current`: allowed unless within the up-cooldown.
    /// - `raw < current`: allowed only if every raw decision across the
    ///   entire down-cooldown was below `current` (and the ring actually
    ///   covers that span). The landing count is the highest raw
    ///   decision seen within that window, so a single deep dip on the
    ///   final tick cannot drag the count below what the policy has
    ///   sustained.
    /// - otherwise the current count is retained.
    pub fn stabilize(&mut self, raw_desired: u32, current: u32, now: u64) -> u32 {
        self.record(raw_desired, now);

        if raw_desired > current {
            if self.cooldown_open(self.last_scale_up, self.scale_up_cooldown, now) {
                return raw_desired;
            }
            return current;
        }

        if raw_desired < current
            && self.cooldown_open(self.last_scale_down, self.scale_down_cooldown, now)
            && let Some(sustained) = self.sustained_down_target(current, now)
        {
            return sustained;
        }

        current
    }

    /// Note an applied scale-up; starts the up-cooldown.
    pub fn record_scale_up(&mut self, now: u64) {
        self.last_scale_up = Some(now);
    }

    /// Note an applied scale-down; starts the down-cooldown.
    pub fn record_scale_down(&mut self, now: u64) {
        self.last_scale_down = Some(now);
    }

    fn record(&mut self, desired: u32, timestamp: u64) {
        self.history.push_back(RawDecision { desired, timestamp });
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        // Drop entries far past the down-cooldown; one entry at or
        // before the cutoff must survive to prove coverage.
        let horizon = timestamp.saturating_sub(self.scale_down_cooldown.as_secs() * 2 + 1);
        while let Some(front) = self.history.front() {
            if front.timestamp < horizon && self.history.len() > 1 {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn cooldown_open(&self, last: Option<u64>, cooldown: Duration, now: u64) -> bool {
        match last {
            None => true,
            Some(ts) => now.saturating_sub(ts) >= cooldown.as_secs(),
        }
    }

    /// The count to scale down to, if the ring shows raw decisions
    /// below `current` for the whole down-cooldown ending at `now`.
    ///
    /// `None` when the window is not covered or any decision inside it
    /// reached `current`. Otherwise the highest raw desired count
    /// within the window: the scale-down lands only as low as the
    /// policy output was sustained, never on a one-tick outlier.
    fn sustained_down_target(&self, current: u32, now: u64) -> Option<u32> {
        let cutoff = now.saturating_sub(self.scale_down_cooldown.as_secs());
        let mut covered = self.scale_down_cooldown.is_zero();
        let mut sustained = None;

        for entry in &self.history {
            if entry.timestamp <= cutoff {
                covered = true;
            }
            if entry.timestamp >= cutoff {
                if entry.desired >= current {
                    return None;
                }
                sustained = Some(sustained.map_or(entry.desired, |s: u32| s.max(entry.desired)));
            }
        }
        covered.then_some(sustained).flatten()
    }
}
