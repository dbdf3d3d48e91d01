//! Error types for benchmark runs.

use thiserror::Error;

/// Errors that can stop a whole benchmark batch.
///
/// Per-variant problems never show up here; they are reported as
/// `SolverFailed` results inside the [`crate::BenchmarkReport`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Parallel mode was requested with zero workers.
    #[error("worker count must be positive")]
    NoWorkers,

    /// The worker pool could not be started.
    #[error("thread pool creation failed: {0}")]
    ThreadPool(String),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
