//! Per-variant solve results.

use std::fmt;
use std::time::Duration;

use krylovbench_core::LinearSystem;
use nalgebra::DVector;
use serde::Serialize;

use crate::engine::DivergenceKind;
use crate::monitor::ConvergenceRecord;

/// Why a run that never produced a usable iterate failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FailureCause {
    /// The configuration was rejected before the engine ran.
    InvalidConfiguration(String),
    /// The engine could not be acquired or reported an internal error.
    Engine(String),
    /// The engine emitted a residual callback the monitor refused.
    MalformedCallback(String),
    /// The run was cancelled before it finished.
    Cancelled,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            FailureCause::Engine(msg) => write!(f, "engine error: {msg}"),
            FailureCause::MalformedCallback(msg) => write!(f, "malformed callback: {msg}"),
            FailureCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a solve ended. Exactly one applies per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TerminationReason {
    Converged,
    MaxIterationsReached,
    SolverDiverged(DivergenceKind),
    SolverFailed(FailureCause),
}

impl TerminationReason {
    /// Short stable label, used in tables and JSON summaries.
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::Converged => "converged",
            TerminationReason::MaxIterationsReached => "max-iterations",
            TerminationReason::SolverDiverged(_) => "diverged",
            TerminationReason::SolverFailed(_) => "failed",
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, TerminationReason::Converged)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TerminationReason::SolverFailed(_))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::SolverDiverged(kind) => write!(f, "diverged ({kind})"),
            TerminationReason::SolverFailed(cause) => write!(f, "failed ({cause})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcome of running one variant on one system.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub(crate) variant: String,
    pub(crate) termination: TerminationReason,
    pub(crate) solution: DVector<f64>,
    pub(crate) convergence: ConvergenceRecord,
    pub(crate) iterations: usize,
    pub(crate) elapsed: Duration,
    pub(crate) initial_residual_norm: f64,
    pub(crate) true_residual_norm: f64,
    pub(crate) convergence_unconfirmed: bool,
}

impl SolveResult {
    /// Result for a run that failed before producing an iterate: zero
    /// solution, empty trace, zero time.
    pub fn failed(variant: impl Into<String>, system: &LinearSystem, cause: FailureCause) -> Self {
        let rhs_norm = system.rhs().norm();
        Self {
            variant: variant.into(),
            termination: TerminationReason::SolverFailed(cause),
            solution: DVector::zeros(system.matrix().cols()),
            convergence: ConvergenceRecord::empty(),
            iterations: 0,
            elapsed: Duration::ZERO,
            initial_residual_norm: rhs_norm,
            true_residual_norm: rhs_norm,
            convergence_unconfirmed: false,
        }
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn termination(&self) -> &TerminationReason {
        &self.termination
    }

    /// Best available iterate. Zeros for a failed run.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    pub fn convergence(&self) -> &ConvergenceRecord {
        &self.convergence
    }

    /// Iterations the engine performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Wall time of the engine solve alone.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// `||b||`, the residual of the zero initial guess.
    pub fn initial_residual_norm(&self) -> f64 {
        self.initial_residual_norm
    }

    /// `||b - A x||` recomputed from the returned solution.
    pub fn true_residual_norm(&self) -> f64 {
        self.true_residual_norm
    }

    /// Last residual the engine reported, or the initial residual when it reported none.
    pub fn final_residual_norm(&self) -> f64 {
        self.convergence
            .last()
            .map(|s| s.residual_norm)
            .unwrap_or(self.initial_residual_norm)
    }

    /// True when the engine claimed convergence but its last reported
    /// residual is above `max(rtol * r0, atol)`.
    pub fn convergence_unconfirmed(&self) -> bool {
        self.convergence_unconfirmed
    }

    pub fn is_converged(&self) -> bool {
        self.termination.is_converged()
    }

    pub fn is_failed(&self) -> bool {
        self.termination.is_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krylovbench_core::SparseMatrix;

    #[test]
    fn failed_result_is_empty() {
        let system = LinearSystem::with_unit_rhs(SparseMatrix::identity(4).unwrap());
        let result = SolveResult::failed("dgmres", &system, FailureCause::Cancelled);

        assert!(result.is_failed());
        assert!(!result.is_converged());
        assert_eq!(result.variant(), "dgmres");
        assert_eq!(result.iterations(), 0);
        assert!(result.convergence().is_empty());
        assert!(!result.convergence_unconfirmed());
        assert_eq!(result.solution().len(), 4);
        assert!(result.solution().iter().all(|&x| x == 0.0));
        assert!((result.final_residual_norm() - 2.0).abs() < 1e-15);
    }

    #[test]
    fn termination_labels() {
        assert_eq!(TerminationReason::Converged.to_string(), "converged");
        assert_eq!(
            TerminationReason::SolverDiverged(DivergenceKind::Breakdown).to_string(),
            "diverged (breakdown)"
        );
        assert_eq!(
            TerminationReason::SolverFailed(FailureCause::Engine("boom".into())).to_string(),
            "failed (engine error: boom)"
        );
        assert_eq!(TerminationReason::MaxIterationsReached.label(), "max-iterations");
    }
}
