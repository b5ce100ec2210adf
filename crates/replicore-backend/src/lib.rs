//! replicore-backend — the orchestration backend adapter.
//!
//! The reconciler treats the backend as an at-least-once, possibly
//! slow, possibly failing external collaborator: every operation
//! returns a typed result, is bounded by a timeout, and is idempotent
//! from the controller's perspective (applying the same replica count
//! twice is harmless).
//!
//! [`KubectlBackend`] is the production adapter; it replaces the
//! fire-and-forget shell invocations of ad-hoc scalers with explicit
//! `scale` / `apply_autoscale_policy` operations.

pub mod kubectl;

pub use kubectl::KubectlBackend;

use replicore_core::{AutoscaleConfig, TargetSpec};
use thiserror::Error;

/// Boxed future type for object-safe async trait methods.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors from a backend apply.
///
/// All variants leave the controller holding its previous replica
/// count; the reconciler retries on a later tick.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The apply did not complete within the bounded timeout.
    #[error("apply timed out after {0}s")]
    Timeout(u64),

    /// The platform rejected the operation.
    #[error("apply rejected: {0}")]
    Rejected(String),

    /// The platform could not be reached at all.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

/// The scale/apply surface of the orchestration platform.
pub trait OrchestrationBackend: Send + Sync {
    /// Scale the target's workload to the given replica count.
    fn scale(&self, target: &TargetSpec, replicas: u32) -> BoxFuture<BackendResult<()>>;

    /// Push the target's autoscale policy (enable or disable automatic
    /// mode) to the platform.
    fn apply_autoscale_policy(
        &self,
        target: &TargetSpec,
        config: &AutoscaleConfig,
    ) -> BoxFuture<BackendResult<()>>;
}
