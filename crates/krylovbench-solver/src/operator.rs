//! Linear operator abstraction for iterative solvers.
//!
//! Krylov methods only need `y = A * x`. Solvers take `&dyn LinearOperator` so
//! the same kernel runs against [`SparseMatrix`] or a test operator.

use krylovbench_core::SparseMatrix;

/// A square linear operator.
pub trait LinearOperator: Send + Sync {
    /// Dimension of the operator (number of rows and columns).
    fn dim(&self) -> usize;

    /// Apply the operator: y = A * x.
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

impl LinearOperator for SparseMatrix {
    fn dim(&self) -> usize {
        self.rows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.spmv(x, y);
    }
}
