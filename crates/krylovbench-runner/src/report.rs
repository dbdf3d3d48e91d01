//! Aggregated benchmark output.
//!
//! The runner does no rendering. [`BenchmarkReport`] keeps the full
//! [`SolveResult`]s for callers that need solutions, and
//! [`BenchmarkReport::summary`] gives a serializable view for reporting tools.

use krylovbench_core::LinearSystem;
use krylovbench_solver::{ConvergenceRecord, SolveResult, TerminationReason};
use serde::Serialize;

/// Per-variant row of a benchmark summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSummary {
    pub variant: String,
    pub termination: TerminationReason,
    pub iterations: usize,
    /// Engine solve time in seconds.
    pub elapsed_secs: f64,
    pub final_residual_norm: f64,
    pub true_residual_norm: f64,
    /// Engine claimed convergence above the stopping threshold.
    pub convergence_unconfirmed: bool,
    /// Full `(iteration, residual)` trace. Empty for failed runs.
    pub convergence: ConvergenceRecord,
}

impl From<&SolveResult> for VariantSummary {
    fn from(result: &SolveResult) -> Self {
        Self {
            variant: result.variant().to_string(),
            termination: result.termination().clone(),
            iterations: result.iterations(),
            elapsed_secs: result.elapsed().as_secs_f64(),
            final_residual_norm: result.final_residual_norm(),
            true_residual_norm: result.true_residual_norm(),
            convergence_unconfirmed: result.convergence_unconfirmed(),
            convergence: result.convergence().clone(),
        }
    }
}

/// Serializable view of a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    pub variants: Vec<VariantSummary>,
}

/// Results of one benchmark batch, in configuration order.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    rows: usize,
    cols: usize,
    nnz: usize,
    results: Vec<SolveResult>,
}

impl BenchmarkReport {
    pub fn new(system: &LinearSystem, results: Vec<SolveResult>) -> Self {
        let matrix = system.matrix();
        Self {
            rows: matrix.rows(),
            cols: matrix.cols(),
            nnz: matrix.nnz(),
            results,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn results(&self) -> &[SolveResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<SolveResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// First result for `variant`, if any.
    pub fn get(&self, variant: &str) -> Option<&SolveResult> {
        self.results.iter().find(|r| r.variant() == variant)
    }

    /// True if at least one run did not end in `SolverFailed`.
    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(|r| !r.is_failed())
    }

    /// Converged run with the smallest solve time.
    pub fn fastest_converged(&self) -> Option<&SolveResult> {
        self.results
            .iter()
            .filter(|r| r.is_converged())
            .min_by_key(|r| r.elapsed())
    }

    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.results.iter().map(VariantSummary::from).collect()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            rows: self.rows,
            cols: self.cols,
            nnz: self.nnz,
            variants: self.summaries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krylovbench_core::SparseMatrix;
    use krylovbench_solver::FailureCause;

    #[test]
    fn all_failed_report() {
        let system = LinearSystem::with_unit_rhs(SparseMatrix::identity(3).unwrap());
        let results = vec![
            SolveResult::failed("dgmres", &system, FailureCause::Engine("unknown".into())),
            SolveResult::failed("gmres", &system, FailureCause::Cancelled),
        ];
        let report = BenchmarkReport::new(&system, results);

        assert_eq!((report.rows(), report.cols(), report.nnz()), (3, 3, 3));
        assert!(!report.any_succeeded());
        assert!(report.fastest_converged().is_none());
        assert_eq!(report.get("gmres").map(|r| r.variant()), Some("gmres"));

        let summary = report.summary();
        assert_eq!(summary.variants.len(), 2);
        assert_eq!(summary.variants[0].variant, "dgmres");
        assert!(summary.variants[0].convergence.is_empty());
        assert_eq!(summary.variants[1].iterations, 0);
    }
}
