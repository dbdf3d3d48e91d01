//! Helper functions for GMRES solver.

/// Dot product of two real vectors.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Compute the 2-norm of a real vector.
#[inline]
pub fn vec_norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// y += alpha * x
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// r = b - A*x, written into `r`. `scratch` receives A*x.
pub fn residual(
    op: &dyn crate::operator::LinearOperator,
    b: &[f64],
    x: &[f64],
    scratch: &mut [f64],
    r: &mut [f64],
) {
    op.apply(x, scratch);
    for ((ri, &bi), &axi) in r.iter_mut().zip(b).zip(scratch.iter()) {
        *ri = bi - axi;
    }
}

/// Compute Givens rotation coefficients for real values.
///
/// Returns (c, s) such that:
/// ```text
/// [ c  s ] [ a ]   [ r ]
/// [-s  c ] [ b ] = [ 0 ]
/// ```
pub fn givens_rotation(a: f64, b: f64) -> (f64, f64) {
    if b.abs() < 1e-300 {
        return (1.0, 0.0);
    }
    let r = a.hypot(b);
    (a / r, b / r)
}
