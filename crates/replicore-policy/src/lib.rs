//! replicore-policy — metric-driven scaling decisions.
//!
//! Two pieces, both free of I/O:
//!
//! - [`engine::decide`] — a pure function from a window of metric
//!   samples, an `AutoscaleConfig`, and the current replica count to a
//!   desired replica count.
//! - [`window::StabilizationWindow`] — cooldown/hysteresis over a
//!   bounded ring of recent raw decisions, preventing oscillation.
//!
//! # Scaling Algorithm
//!
//! ```text
//! ratio(metric) = observed_average / target
//! desired       = ceil(current * max(ratio over enabled metrics))
//! final         = clamp(desired, min, max)
//! ```
//!
//! Taking the max (not the average) across metrics is deliberate: any
//! single overloaded resource drives scale-up. Scale-ups pass as soon
//! as the up-cooldown allows; scale-downs additionally require the raw
//! desired count to have stayed below current for the entire
//! down-cooldown.

pub mod engine;
pub mod window;

pub use engine::{PolicyDecision, decide};
pub use window::StabilizationWindow;
