//! Solve-engine seam.
//!
//! The driver never does Krylov arithmetic itself. It asks an [`EngineFactory`]
//! for a fresh [`SolveEngine`] handle per run, hands it the matrix, the
//! right-hand side, and the [`SolverConfig`], and listens to the residual
//! callbacks through a [`ResidualObserver`]. Because each run owns its handle,
//! engines need not be reentrant.

use krylovbench_core::SparseMatrix;
use serde::Serialize;
use thiserror::Error;

use crate::config::SolverConfig;
use crate::preconditioner::IluError;

/// Reply from an observer to a residual callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverAction {
    Continue,
    /// Stop iterating and return the current iterate with [`EngineSignal::Aborted`].
    Abort,
}

/// Receives one callback per engine iteration.
pub trait ResidualObserver {
    fn on_residual(&mut self, iteration: usize, residual_norm: f64) -> ObserverAction;
}

/// How a run diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DivergenceKind {
    /// Residual exceeded the divergence tolerance times the initial residual.
    ResidualGrowth,
    /// Residual became NaN or infinite.
    NonFinite,
    /// Krylov basis broke down without reaching the tolerance.
    Breakdown,
}

impl std::fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivergenceKind::ResidualGrowth => write!(f, "residual growth"),
            DivergenceKind::NonFinite => write!(f, "non-finite residual"),
            DivergenceKind::Breakdown => write!(f, "breakdown"),
        }
    }
}

/// Termination signal reported by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    /// The engine's residual test `r <= max(rtol * r0, atol)` passed.
    ToleranceSatisfied,
    /// Iteration cap reached without satisfying the tolerance.
    IterationLimit,
    Diverged(DivergenceKind),
    /// The observer asked the engine to stop.
    Aborted,
}

/// Output of a completed engine solve.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    /// Best available iterate, even on non-convergence.
    pub solution: Vec<f64>,
    /// Inner iterations performed.
    pub iterations: usize,
    /// Residual norm of the initial guess.
    pub initial_residual_norm: f64,
    pub signal: EngineSignal,
}

/// Engine-internal failures. These end a run as `SolverFailed`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown solver variant '{0}'")]
    UnknownVariant(String),

    #[error("unsupported preconditioner '{0}'")]
    UnsupportedPreconditioner(String),

    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("right-hand side has length {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("preconditioner setup failed: {0}")]
    Preconditioner(#[from] IluError),

    /// Handle could not be obtained.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Handle used after release.
    #[error("engine handle already released")]
    Released,

    /// Releasing engine resources failed.
    #[error("engine release failed: {0}")]
    Release(String),
}

/// One engine handle. Owned by exactly one driver run.
pub trait SolveEngine: Send {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Solve `matrix * x = rhs` from a zero initial guess.
    ///
    /// Calls `observer` once per iteration with strictly increasing indices
    /// starting at 1. It may call it zero times when the initial guess already
    /// satisfies the tolerance.
    fn solve(
        &mut self,
        matrix: &SparseMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        observer: &mut dyn ResidualObserver,
    ) -> Result<EngineOutcome, EngineError>;

    /// Release resources held by the handle.
    fn release(&mut self) -> Result<(), EngineError>;
}

/// Source of engine handles. Shared across runs, so it must be `Sync`.
pub trait EngineFactory: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn SolveEngine>, EngineError>;
}
