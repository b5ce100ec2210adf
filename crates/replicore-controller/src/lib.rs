//! replicore-controller — the closed-loop reconciler.
//!
//! On each tick, a per-target worker pulls the latest metric samples,
//! asks the policy engine for a desired replica count, smooths it
//! through the stabilization window, and — only if the count changed —
//! issues a scale command to the orchestration backend, publishing the
//! decision to observers either way.
//!
//! # Tick state machine
//!
//! ```text
//! Idle → Sampling → Deciding → Applying → Idle
//!   └────────────── Stopped (shutdown or target removed)
//! ```
//!
//! Each target has exactly one worker task; that task is the only
//! writer of the target's current replica count, so decisions per
//! target are strictly ordered while targets stay independent of each
//! other.

pub mod reconciler;
pub mod registry;

pub use reconciler::{Reconciler, ReconcilerSettings, TickPhase};
pub use registry::TargetRegistry;
