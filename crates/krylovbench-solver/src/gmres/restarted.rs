//! Restarted GMRES kernel shared by every built-in variant.
//!
//! One routine covers the whole family. The variants differ only in:
//!
//! - how each new Krylov vector is orthogonalized ([`Orthogonalization`]),
//! - whether the preconditioned search directions are stored (`flexible`),
//! - how many error-approximation vectors from earlier cycles are appended
//!   to the search space (`augmentation`, LGMRES).
//!
//! Preconditioning is applied on the right, so the residual estimate reported
//! to the observer is the true residual norm `||b - A x||` in exact arithmetic.

use std::collections::VecDeque;

use super::helpers::{axpy, dot, givens_rotation, residual, vec_norm};
use crate::config::{DEFAULT_DIVERGENCE_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_RESTART};
use crate::engine::{
    DivergenceKind, EngineOutcome, EngineSignal, ObserverAction, ResidualObserver,
};
use crate::operator::LinearOperator;
use crate::preconditioner::Preconditioner;

/// New Arnoldi vectors shorter than this fraction of `||A z||` end the cycle.
const BREAKDOWN_RTOL: f64 = 1e-14;

/// A restart that follows a breakdown must shrink the residual by at least this much.
const STAGNATION_RTOL: f64 = 1e-12;

/// Gram-Schmidt flavour used in the Arnoldi process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orthogonalization {
    /// Subtract each projection before computing the next one.
    Modified,
    /// Compute all projections against the unmodified vector, then subtract.
    Classical,
}

/// Parameters for [`solve_restarted`].
#[derive(Debug, Clone)]
pub struct GmresParams {
    /// Total search-space dimension per cycle (Arnoldi plus augmentation steps).
    pub restart: usize,
    pub max_iterations: usize,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub divergence_tolerance: f64,
    pub orthogonalization: Orthogonalization,
    /// Store `M^(-1) v_k` per step instead of applying `M^(-1)` once per cycle.
    pub flexible: bool,
    /// Number of error-approximation vectors carried between cycles.
    pub augmentation: usize,
}

impl Default for GmresParams {
    fn default() -> Self {
        Self {
            restart: DEFAULT_RESTART,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-50,
            divergence_tolerance: DEFAULT_DIVERGENCE_TOLERANCE,
            orthogonalization: Orthogonalization::Modified,
            flexible: false,
            augmentation: 0,
        }
    }
}

fn outcome(x: Vec<f64>, iterations: usize, r0: f64, signal: EngineSignal) -> EngineOutcome {
    EngineOutcome {
        solution: x,
        iterations,
        initial_residual_norm: r0,
        signal,
    }
}

/// Solve A*x = b from a zero initial guess with right-preconditioned restarted GMRES.
///
/// The observer sees one callback per inner iteration, numbered from 1. The
/// iteration cap is exact: no more than `params.max_iterations` operator
/// applications are spent on Krylov steps.
pub fn solve_restarted(
    op: &dyn LinearOperator,
    precond: &dyn Preconditioner,
    b: &[f64],
    params: &GmresParams,
    observer: &mut dyn ResidualObserver,
) -> EngineOutcome {
    let n = op.dim();
    assert_eq!(b.len(), n, "RHS dimension mismatch");
    assert_eq!(precond.dim(), n, "Preconditioner dimension mismatch");

    let mut x = vec![0.0; n];
    let b_norm = vec_norm(b);
    if !b_norm.is_finite() {
        return outcome(x, 0, b_norm, EngineSignal::Diverged(DivergenceKind::NonFinite));
    }

    let threshold = (params.relative_tolerance * b_norm).max(params.absolute_tolerance);
    if b_norm <= threshold {
        return outcome(x, 0, b_norm, EngineSignal::ToleranceSatisfied);
    }
    let divergence_limit = params.divergence_tolerance * b_norm;

    let store_directions = params.flexible || params.augmentation > 0;
    let mut augment: VecDeque<Vec<f64>> = VecDeque::with_capacity(params.augmentation);
    let mut total_iter = 0;
    let mut scratch = vec![0.0; n];
    let mut r = vec![0.0; n];
    let mut previous_beta = f64::INFINITY;
    let mut after_breakdown = false;

    loop {
        // Compute residual r = b - A*x
        residual(op, b, &x, &mut scratch, &mut r);
        let beta = vec_norm(&r);

        if !beta.is_finite() {
            return outcome(x, total_iter, b_norm, EngineSignal::Diverged(DivergenceKind::NonFinite));
        }
        if beta == 0.0 {
            return outcome(x, total_iter, b_norm, EngineSignal::ToleranceSatisfied);
        }
        if after_breakdown && beta >= previous_beta * (1.0 - STAGNATION_RTOL) {
            return outcome(x, total_iter, b_norm, EngineSignal::Diverged(DivergenceKind::Breakdown));
        }
        previous_beta = beta;

        let m = params.restart.min(n).max(1);
        let n_aug = augment.len().min(m - 1);
        let arnoldi_steps = m - n_aug;

        let mut v: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
        let mut z: Vec<Vec<f64>> = Vec::with_capacity(if store_directions { m } else { 0 });
        let mut h = vec![vec![0.0; m + 1]; m];

        // v[0] = r / ||r||
        let inv_beta = 1.0 / beta;
        v.push(r.iter().map(|&ri| ri * inv_beta).collect());

        // g = ||r|| * e_1
        let mut g = vec![0.0; m + 1];
        g[0] = beta;

        // Givens rotation storage
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];

        let mut signal = None;
        let mut broke_down = false;
        let mut k = 0;
        while k < m {
            if total_iter >= params.max_iterations {
                break;
            }
            total_iter += 1;

            // Search direction: M^(-1) v[k], or an augmentation vector for the
            // trailing steps of an LGMRES cycle.
            let dir = if k < arnoldi_steps {
                let mut d = vec![0.0; n];
                precond.apply(&v[k], &mut d);
                d
            } else {
                augment[k - arnoldi_steps].clone()
            };

            let mut w = vec![0.0; n];
            op.apply(&dir, &mut w);
            let w_in = vec_norm(&w);

            orthogonalize(&mut w, &v, &mut h[k], params.orthogonalization);
            let w_norm = vec_norm(&w);
            let breakdown = w_norm <= BREAKDOWN_RTOL * w_in;
            h[k][k + 1] = if breakdown { 0.0 } else { w_norm };

            // Apply previous Givens rotations to h[k]
            for j in 0..k {
                let temp = cs[j] * h[k][j] + sn[j] * h[k][j + 1];
                h[k][j + 1] = -sn[j] * h[k][j] + cs[j] * h[k][j + 1];
                h[k][j] = temp;
            }

            // Compute new Givens rotation. A step whose column vanishes entirely
            // adds nothing to the search space, so the residual carries over.
            let (c, s) = if breakdown && h[k][k].abs() <= BREAKDOWN_RTOL * w_in {
                (0.0, 1.0)
            } else {
                givens_rotation(h[k][k], h[k][k + 1])
            };
            cs[k] = c;
            sn[k] = s;
            h[k][k] = c * h[k][k] + s * h[k][k + 1];
            h[k][k + 1] = 0.0;
            g[k + 1] = -s * g[k];
            g[k] *= c;

            if store_directions {
                z.push(dir);
            }
            k += 1;

            let estimate = g[k].abs();
            if !estimate.is_finite() {
                signal = Some(EngineSignal::Diverged(DivergenceKind::NonFinite));
                break;
            }
            if observer.on_residual(total_iter, estimate) == ObserverAction::Abort {
                signal = Some(EngineSignal::Aborted);
                break;
            }
            if estimate <= threshold {
                signal = Some(EngineSignal::ToleranceSatisfied);
                break;
            }
            if estimate > divergence_limit {
                signal = Some(EngineSignal::Diverged(DivergenceKind::ResidualGrowth));
                break;
            }
            if breakdown {
                broke_down = true;
                break;
            }

            let inv_w = 1.0 / w_norm;
            v.push(w.iter().map(|&wi| wi * inv_w).collect());
        }

        // A NaN in H would poison x; keep the last finite iterate instead.
        if signal != Some(EngineSignal::Diverged(DivergenceKind::NonFinite)) {
            let y = back_substitute(&h, &g, k);
            let x_before = (params.augmentation > 0).then(|| x.clone());

            if store_directions {
                // x = x + Z * y
                for (zi, &yi) in z.iter().zip(&y) {
                    axpy(yi, zi, &mut x);
                }
            } else {
                // x = x + M^(-1) * (V * y)
                let mut t = vec![0.0; n];
                for (vi, &yi) in v.iter().zip(&y) {
                    axpy(yi, vi, &mut t);
                }
                precond.apply(&t, &mut scratch);
                axpy(1.0, &scratch, &mut x);
            }

            if let Some(prev) = x_before {
                let mut dx: Vec<f64> = x.iter().zip(&prev).map(|(a, b)| a - b).collect();
                let dx_norm = vec_norm(&dx);
                if dx_norm > 0.0 && dx_norm.is_finite() {
                    dx.iter_mut().for_each(|d| *d /= dx_norm);
                    augment.push_front(dx);
                    augment.truncate(params.augmentation);
                }
            }
        }

        log::trace!(
            "gmres cycle: steps={}, total={}, estimate={:.3e}",
            k,
            total_iter,
            g[k].abs()
        );

        if let Some(signal) = signal {
            return outcome(x, total_iter, b_norm, signal);
        }
        if total_iter >= params.max_iterations {
            return outcome(x, total_iter, b_norm, EngineSignal::IterationLimit);
        }
        after_breakdown = broke_down;
    }
}

/// Orthogonalize `w` against `basis`, storing the projections in `h_col`.
fn orthogonalize(
    w: &mut [f64],
    basis: &[Vec<f64>],
    h_col: &mut [f64],
    method: Orthogonalization,
) {
    match method {
        Orthogonalization::Modified => {
            for (j, vj) in basis.iter().enumerate() {
                let hij = dot(vj, w);
                h_col[j] = hij;
                axpy(-hij, vj, w);
            }
        }
        Orthogonalization::Classical => {
            for (j, vj) in basis.iter().enumerate() {
                h_col[j] = dot(vj, w);
            }
            for (j, vj) in basis.iter().enumerate() {
                axpy(-h_col[j], vj, w);
            }
        }
    }
}

/// Back-substitution to find y from H*y = g, H upper triangular (column-major).
fn back_substitute(h: &[Vec<f64>], g: &[f64], k: usize) -> Vec<f64> {
    let mut y = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[j][i] * y[j];
        }
        if h[i][i].abs() > 1e-30 {
            y[i] = sum / h[i][i];
        }
    }
    y
}
