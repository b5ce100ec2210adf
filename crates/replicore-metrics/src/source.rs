//! The `MetricsSource` trait and its error taxonomy.

use replicore_core::{MetricSample, TargetSpec};
use thiserror::Error;

/// Result type alias for metric fetches.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Boxed future type for object-safe async trait methods.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Errors from a metrics fetch.
///
/// None of these fail a reconciler tick: an unavailable source simply
/// contributes no new samples, and the policy engine excludes metrics
/// it has no observations for.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics unavailable: {0}")]
    Unavailable(String),

    #[error("metrics fetch timed out after {0}s")]
    Timeout(u64),

    #[error("metrics command failed: {0}")]
    Command(String),

    #[error("failed to parse metrics output: {0}")]
    Parse(String),
}

/// A source of per-target metric samples.
///
/// External collaborator of the reconciler; implementations must
/// tolerate partially-missing metrics (absent usage or limit) by
/// omitting the affected sample rather than erroring.
pub trait MetricsSource: Send + Sync {
    /// Fetch the latest samples for one target.
    fn fetch(&self, target: &TargetSpec) -> BoxFuture<MetricsResult<Vec<MetricSample>>>;
}
