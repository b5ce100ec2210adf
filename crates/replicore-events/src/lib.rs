//! replicore-events — decision fan-out to connected observers.
//!
//! The reconciler publishes every applied (or deliberately skipped)
//! decision through an [`EventBus`]. Publishing is fire-and-forget: a
//! slow or disconnected observer never blocks the control loop, and a
//! lagging observer loses the oldest events first (bounded per-observer
//! buffer with drop-oldest on overflow — `tokio::sync::broadcast` lag
//! semantics).

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use replicore_core::{DecisionReason, ScalingDecision, TargetId};

/// Default per-observer buffer capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// An event pushed to observers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A scaling decision was made (applied or no-change).
    Decision {
        target_id: TargetId,
        replicas: u32,
        reason: DecisionReason,
        timestamp: u64,
    },
    /// An apply against the orchestration backend failed; the previous
    /// replica count was retained.
    ApplyFailed {
        target_id: TargetId,
        attempted_replicas: u32,
        error: String,
        timestamp: u64,
    },
}

impl ControlEvent {
    pub fn from_decision(decision: &ScalingDecision) -> Self {
        ControlEvent::Decision {
            target_id: decision.target_id.clone(),
            replicas: decision.desired_replicas,
            reason: decision.reason,
            timestamp: decision.timestamp,
        }
    }
}

/// Broadcast bus for control events.
///
/// Observers subscribe and unsubscribe (drop the receiver) at any
/// time; zero subscribers is fine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ControlEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current observers. Never blocks, never
    /// fails; an empty audience just drops the event.
    pub fn publish(&self, event: ControlEvent) {
        trace!(?event, "publishing control event");
        let _ = self.tx.send(event);
    }

    /// Subscribe a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.tx.subscribe()
    }

    /// Number of currently-connected observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
