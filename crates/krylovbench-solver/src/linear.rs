//! Direct sparse solve, used as a reference to check Krylov iterates against.

use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};
use krylovbench_core::LinearSystem;
use nalgebra::DVector;

use crate::error::{Error, Result};

/// Solve `A x = b` with a sparse LU factorization.
///
/// Fails with `DimensionMismatch` for a non-square matrix and
/// [`Error::SingularMatrix`] when the factorization breaks down or yields a
/// non-finite solution.
pub fn solve_direct(system: &LinearSystem) -> Result<DVector<f64>> {
    let matrix = system.matrix();
    if !matrix.is_square() {
        return Err(krylovbench_core::Error::DimensionMismatch {
            expected: matrix.rows(),
            actual: matrix.cols(),
        }
        .into());
    }
    let size = matrix.rows();
    let rhs = system.rhs();

    // Convert CSR entries to faer triplets
    let faer_triplets: Vec<_> = matrix
        .triplets()
        .into_iter()
        .map(|(r, c, v)| Triplet::new(r, c, v))
        .collect();

    let sparse_mat = SparseColMat::<usize, f64>::try_new_from_triplets(size, size, &faer_triplets)
        .map_err(|_| Error::SingularMatrix)?;

    let lu = sparse_mat.sp_lu().map_err(|_| Error::SingularMatrix)?;

    let faer_rhs = Col::<f64>::from_fn(size, |i| rhs[i]);
    let faer_x = lu.solve(&faer_rhs);

    let x = DVector::from_fn(size, |i, _| faer_x[i]);
    if x.iter().any(|xi| !xi.is_finite()) {
        return Err(Error::SingularMatrix);
    }
    log::trace!("direct solve: n={}, nnz={}", size, matrix.nnz());
    Ok(x)
}
