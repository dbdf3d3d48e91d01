//! Preconditioners for the built-in Krylov engine.
//!
//! Preconditioners improve the convergence rate of GMRES-family solvers by
//! transforming the linear system into one with better spectral properties.
//! The engine applies them on the right, so the residual it reports is the
//! true residual `||b - A x||`.
//!
//! Available by name through [`build_preconditioner`]:
//!
//! | Name | Type |
//! |------|------|
//! | `none` | [`IdentityPreconditioner`] |
//! | `jacobi` | [`JacobiPreconditioner`] |
//! | `ilu`, `ilu0` | [`Ilu0Preconditioner`] |

use krylovbench_core::SparseMatrix;
use thiserror::Error;

use crate::config::PreconditionerChoice;
use crate::engine::EngineError;

/// Given a linear system Ax = b, a preconditioner M approximates A, and
/// applying it computes y = M^(-1) * x.
pub trait Preconditioner: Send + Sync {
    /// Apply the preconditioner: y = M^(-1) * x.
    fn apply(&self, x: &[f64], y: &mut [f64]);

    /// Dimension of the preconditioner.
    fn dim(&self) -> usize;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Build the preconditioner selected by `choice` for `matrix`.
pub fn build_preconditioner(
    choice: &PreconditionerChoice,
    matrix: &SparseMatrix,
) -> Result<Box<dyn Preconditioner>, EngineError> {
    match choice {
        PreconditionerChoice::None => Ok(Box::new(IdentityPreconditioner::new(matrix.rows()))),
        PreconditionerChoice::Named(name) => match name.as_str() {
            "none" | "identity" => Ok(Box::new(IdentityPreconditioner::new(matrix.rows()))),
            "jacobi" => Ok(Box::new(JacobiPreconditioner::from_matrix(matrix))),
            "ilu" | "ilu0" => Ok(Box::new(Ilu0Preconditioner::from_matrix(matrix)?)),
            other => Err(EngineError::UnsupportedPreconditioner(other.to_string())),
        },
    }
}

// ============================================================================
// Identity
// ============================================================================

/// No-op preconditioner: M = I.
pub struct IdentityPreconditioner {
    size: usize,
}

impl IdentityPreconditioner {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        y.copy_from_slice(x);
    }

    fn dim(&self) -> usize {
        self.size
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

// ============================================================================
// Jacobi (Diagonal) Preconditioner
// ============================================================================

/// Jacobi (diagonal) preconditioner.
///
/// Uses M = diag(A), so M^(-1) * x = x / diag(A). Zero or near-zero diagonal
/// entries are replaced with 1.0 to avoid division issues.
pub struct JacobiPreconditioner {
    /// Inverse of diagonal elements.
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    /// Extract the diagonal of `matrix`.
    pub fn from_matrix(matrix: &SparseMatrix) -> Self {
        Self::from_diagonal(&matrix.diagonal())
    }

    /// Create from a diagonal vector.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let inv_diag: Vec<f64> = diag
            .iter()
            .map(|&d| if d.abs() < 1e-30 { 1.0 } else { 1.0 / d })
            .collect();

        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.inv_diag.len());
        assert_eq!(y.len(), self.inv_diag.len());

        for ((yi, &xi), &inv_di) in y.iter_mut().zip(x).zip(&self.inv_diag) {
            *yi = xi * inv_di;
        }
    }

    fn dim(&self) -> usize {
        self.inv_diag.len()
    }

    fn name(&self) -> &'static str {
        "jacobi"
    }
}

// ============================================================================
// ILU(0)
// ============================================================================

/// ILU(0) factorization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IluError {
    /// Row has no stored diagonal entry.
    #[error("missing diagonal entry in row {0}")]
    MissingDiagonal(usize),

    /// Pivot became (numerically) zero during factorization.
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),

    /// ILU needs a square matrix.
    #[error("ILU(0) requires a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
}

/// Incomplete LU factorization with zero fill-in.
///
/// The L factor (unit diagonal, implicit) is stored below the diagonal and U
/// on and above it, on the sparsity pattern of the original matrix:
///
/// ```text
/// For i = 1 to n-1:
///   For k < i where A(i,k) != 0:
///     A(i,k) = A(i,k) / A(k,k)
///     For j > k where A(k,j) != 0 and A(i,j) is in the pattern:
///       A(i,j) = A(i,j) - A(i,k) * A(k,j)
/// ```
pub struct Ilu0Preconditioner {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    /// Combined L (below diagonal) and U (on/above diagonal) values.
    lu_values: Vec<f64>,
    /// Index of diagonal entry for each row.
    diag_idx: Vec<usize>,
}

impl Ilu0Preconditioner {
    /// Factorize `matrix` on its own sparsity pattern.
    pub fn from_matrix(matrix: &SparseMatrix) -> Result<Self, IluError> {
        if !matrix.is_square() {
            return Err(IluError::NotSquare {
                rows: matrix.rows(),
                cols: matrix.cols(),
            });
        }
        let size = matrix.rows();
        let row_ptr = matrix.row_offsets().to_vec();
        let col_idx = matrix.col_indices().to_vec();

        let mut diag_idx = vec![0; size];
        for (i, slot) in diag_idx.iter_mut().enumerate() {
            let start = row_ptr[i];
            let end = row_ptr[i + 1];
            match col_idx[start..end].binary_search(&i) {
                Ok(pos) => *slot = start + pos,
                Err(_) => return Err(IluError::MissingDiagonal(i)),
            }
        }

        let mut lu_values = matrix.values().to_vec();
        factorize(&row_ptr, &col_idx, &diag_idx, &mut lu_values)?;

        Ok(Self {
            row_ptr,
            col_idx,
            lu_values,
            diag_idx,
        })
    }

    pub fn nnz(&self) -> usize {
        self.lu_values.len()
    }
}

/// In-place ILU(0). Column indices are sorted within each row, so lookups
/// into row `i` use binary search.
fn factorize(
    row_ptr: &[usize],
    col_idx: &[usize],
    diag_idx: &[usize],
    lu: &mut [f64],
) -> Result<(), IluError> {
    let size = diag_idx.len();
    for i in 1..size {
        let row_start = row_ptr[i];
        let row_end = row_ptr[i + 1];

        for k_ptr in row_start..row_end {
            let k = col_idx[k_ptr];
            if k >= i {
                break;
            }

            let a_kk = lu[diag_idx[k]];
            if a_kk.abs() < 1e-30 {
                return Err(IluError::ZeroPivot(k));
            }
            lu[k_ptr] /= a_kk;
            let a_ik = lu[k_ptr];

            for j_ptr in (diag_idx[k] + 1)..row_ptr[k + 1] {
                let j = col_idx[j_ptr];
                // Fill-in outside the pattern is dropped.
                if let Ok(pos) = col_idx[row_start..row_end].binary_search(&j) {
                    lu[row_start + pos] -= a_ik * lu[j_ptr];
                }
            }
        }
    }

    if let Some(i) = (0..size).find(|&i| lu[diag_idx[i]].abs() < 1e-30) {
        return Err(IluError::ZeroPivot(i));
    }
    Ok(())
}

impl Preconditioner for Ilu0Preconditioner {
    /// Solves L*z = x (forward substitution), then U*y = z (back substitution).
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let n = self.diag_idx.len();
        assert_eq!(x.len(), n);
        assert_eq!(y.len(), n);

        y.copy_from_slice(x);

        for i in 0..n {
            let row_start = self.row_ptr[i];
            let diag = self.diag_idx[i];
            for k in row_start..diag {
                y[i] -= self.lu_values[k] * y[self.col_idx[k]];
            }
        }

        for i in (0..n).rev() {
            let diag = self.diag_idx[i];
            let row_end = self.row_ptr[i + 1];
            for k in (diag + 1)..row_end {
                y[i] -= self.lu_values[k] * y[self.col_idx[k]];
            }
            y[i] /= self.lu_values[diag];
        }
    }

    fn dim(&self) -> usize {
        self.diag_idx.len()
    }

    fn name(&self) -> &'static str {
        "ilu0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal(n: usize) -> SparseMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        SparseMatrix::from_triplets(n, n, &triplets).unwrap()
    }

    #[test]
    fn identity_copies_input() {
        let p = IdentityPreconditioner::new(3);
        let mut y = vec![0.0; 3];
        p.apply(&[1.0, -2.0, 3.0], &mut y);
        assert_eq!(y, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn jacobi_from_matrix() {
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 2.0)])
            .unwrap();
        let p = JacobiPreconditioner::from_matrix(&m);
        let mut y = vec![0.0; 2];
        p.apply(&[8.0, 6.0], &mut y);
        assert!((y[0] - 2.0).abs() < 1e-15);
        assert!((y[1] - 3.0).abs() < 1e-15);
    }

    #[test]
    fn jacobi_zero_diagonal_is_unscaled() {
        let p = JacobiPreconditioner::from_diagonal(&[0.0, 5.0]);
        let mut y = vec![0.0; 2];
        p.apply(&[3.0, 10.0], &mut y);
        assert_eq!(y, vec![3.0, 2.0]);
    }

    #[test]
    fn ilu0_is_exact_for_tridiagonal() {
        // No fill-in for a tridiagonal matrix, so ILU(0) equals LU.
        let m = tridiagonal(5);
        let p = Ilu0Preconditioner::from_matrix(&m).unwrap();
        assert_eq!(p.nnz(), m.nnz());

        let x_true = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut b = vec![0.0; 5];
        m.spmv(&x_true, &mut b);

        let mut x = vec![0.0; 5];
        p.apply(&b, &mut x);
        for (xi, ti) in x.iter().zip(&x_true) {
            assert!((xi - ti).abs() < 1e-12);
        }
    }

    #[test]
    fn ilu0_missing_diagonal() {
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]).unwrap();
        assert_eq!(
            Ilu0Preconditioner::from_matrix(&m).err(),
            Some(IluError::MissingDiagonal(1))
        );
    }

    #[test]
    fn ilu0_zero_pivot() {
        // [1 1; 1 1] eliminates to a zero U(1,1).
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 1.0)])
            .unwrap();
        assert_eq!(
            Ilu0Preconditioner::from_matrix(&m).err(),
            Some(IluError::ZeroPivot(1))
        );
    }

    #[test]
    fn build_by_name() {
        let m = tridiagonal(4);
        assert_eq!(build_preconditioner(&PreconditionerChoice::None, &m).unwrap().name(), "none");
        assert_eq!(
            build_preconditioner(&PreconditionerChoice::parse("jacobi"), &m).unwrap().name(),
            "jacobi"
        );
        assert_eq!(
            build_preconditioner(&PreconditionerChoice::parse("ILU"), &m).unwrap().name(),
            "ilu0"
        );
        assert!(matches!(
            build_preconditioner(&PreconditionerChoice::parse("amg"), &m),
            Err(EngineError::UnsupportedPreconditioner(name)) if name == "amg"
        ));
    }
}
