//! Error types for solver configuration and driving.

use thiserror::Error;

use crate::driver::DriverState;
use crate::engine::EngineError;

/// Errors raised by the solver layer.
///
/// Only misuse and construction problems surface here. Expected solve outcomes
/// (non-convergence, divergence, engine failure) are reported through
/// [`crate::TerminationReason`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Matrix or system construction error.
    #[error(transparent)]
    Core(#[from] krylovbench_core::Error),

    /// Configuration does not yield a decidable stopping rule or is otherwise invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Residual callback arrived with an iteration index that did not increase.
    #[error("non-monotonic iteration index: {got} after {previous}")]
    NonMonotonicIteration { previous: usize, got: usize },

    /// Residual callback carried a negative or NaN norm.
    #[error("invalid residual norm {value} at iteration {iteration}")]
    InvalidResidual { iteration: usize, value: f64 },

    /// Driver operation called in the wrong lifecycle state.
    #[error("driver is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: DriverState,
        actual: DriverState,
    },

    /// Engine-level failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Direct factorization found the matrix singular.
    #[error("singular matrix")]
    SingularMatrix,
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, Error>;
