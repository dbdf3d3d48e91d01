//! Linear system `A x = b`.

use nalgebra::DVector;

use crate::error::{Error, Result};
use crate::matrix::SparseMatrix;

/// An assembled matrix paired with a right-hand side of matching length.
///
/// Read-only after construction. Solver runs borrow it; none of them can
/// change the matrix or the right-hand side another run sees.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    matrix: SparseMatrix,
    rhs: DVector<f64>,
}

impl LinearSystem {
    /// Pair `matrix` with `rhs`.
    ///
    /// Fails with [`Error::DimensionMismatch`] when `rhs.len() != matrix.rows()`.
    pub fn new(matrix: SparseMatrix, rhs: DVector<f64>) -> Result<Self> {
        if rhs.len() != matrix.rows() {
            return Err(Error::DimensionMismatch {
                expected: matrix.rows(),
                actual: rhs.len(),
            });
        }
        Ok(Self { matrix, rhs })
    }

    /// Build from raw loader output: `(rows, cols, triplets)` and `(len, values)`.
    pub fn from_raw(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f64)],
        rhs_len: usize,
        rhs_values: &[f64],
    ) -> Result<Self> {
        if rhs_values.len() != rhs_len {
            return Err(Error::DimensionMismatch {
                expected: rhs_len,
                actual: rhs_values.len(),
            });
        }
        let matrix = SparseMatrix::from_triplets(rows, cols, triplets)?;
        Self::new(matrix, DVector::from_column_slice(rhs_values))
    }

    /// Pair `matrix` with a right-hand side of all ones.
    pub fn with_unit_rhs(matrix: SparseMatrix) -> Self {
        let rhs = DVector::from_element(matrix.rows(), 1.0);
        Self { matrix, rhs }
    }

    /// Pair `matrix` with `b = A * x_exact`, so the exact solution is known.
    pub fn with_known_solution(matrix: SparseMatrix, x_exact: &DVector<f64>) -> Result<Self> {
        if x_exact.len() != matrix.cols() {
            return Err(Error::DimensionMismatch {
                expected: matrix.cols(),
                actual: x_exact.len(),
            });
        }
        let rhs = matrix.mul_vector(x_exact);
        Ok(Self { matrix, rhs })
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// System dimension (number of equations).
    pub fn dim(&self) -> usize {
        self.matrix.rows()
    }

    /// `||b - A x||_2` for a candidate solution.
    pub fn residual_norm(&self, x: &DVector<f64>) -> Result<f64> {
        if x.len() != self.matrix.cols() {
            return Err(Error::DimensionMismatch {
                expected: self.matrix.cols(),
                actual: x.len(),
            });
        }
        let ax = self.matrix.mul_vector(x);
        Ok((&self.rhs - ax).norm())
    }
}
