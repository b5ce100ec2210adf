//! replicore-metrics — metric ingestion for the Replicore control plane.
//!
//! The reconciler consumes metrics through the [`MetricsSource`]
//! trait; a fetch that fails or times out degrades that tick, never
//! crashes it. Samples are retained per target in a bounded
//! [`SampleWindow`] covering the controller's decision window only —
//! no long-term history.
//!
//! The production adapter is [`KubectlTopSource`], which shells out to
//! `kubectl top pod` and converts raw usage quantities (`250m` CPU,
//! `128Mi` memory) into utilization percent against the target's
//! configured per-pod limits.

pub mod kubectl;
pub mod source;
pub mod window;

pub use kubectl::KubectlTopSource;
pub use source::{BoxFuture, MetricsError, MetricsResult, MetricsSource};
pub use window::SampleWindow;
