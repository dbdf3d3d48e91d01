//! Generated test problems.
//!
//! Each source produces raw `(row, col, value)` triplets the way a matrix
//! loader would, and the system is assembled from them.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, bail};
use krylovbench_core::{DVector, LinearSystem, SparseMatrix};

const DEFAULT_PECLET: f64 = 10.0;

/// A named, parameterized matrix source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProblemSource {
    /// `identity:N`
    Identity(usize),
    /// `diag:N`, entries `1, 2, ..., N`
    Diagonal(usize),
    /// `tridiag:N`, 1-D Poisson stencil `[-1, 2, -1]`
    Tridiagonal(usize),
    /// `laplace2d:N`, 5-point Laplacian on an N x N grid
    Laplace2d(usize),
    /// `convdiff:N[:PECLET]`, first-order upwind convection-diffusion on an N x N grid
    ConvectionDiffusion { n: usize, peclet: f64 },
}

impl FromStr for ProblemSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut parts = s.split(':');
        let kind = parts.next().unwrap_or_default().to_lowercase();
        let size: usize = match parts.next() {
            Some(n) => n
                .parse()
                .with_context(|| format!("invalid size '{n}' in problem source '{s}'"))?,
            None => bail!("problem source '{s}' needs a size, e.g. '{kind}:100'"),
        };

        if matches!(kind.as_str(), "laplace2d" | "convdiff") && grid_unknowns(size).is_none() {
            bail!("grid size {size} in problem source '{s}' is too large");
        }

        let source = match kind.as_str() {
            "identity" => ProblemSource::Identity(size),
            "diag" => ProblemSource::Diagonal(size),
            "tridiag" => ProblemSource::Tridiagonal(size),
            "laplace2d" => ProblemSource::Laplace2d(size),
            "convdiff" => {
                let peclet = match parts.next() {
                    Some(p) => p
                        .parse()
                        .with_context(|| format!("invalid Peclet number '{p}'"))?,
                    None => DEFAULT_PECLET,
                };
                return finish(
                    ProblemSource::ConvectionDiffusion { n: size, peclet },
                    parts.next(),
                    s,
                );
            }
            other => bail!(
                "unknown problem source '{other}' (expected identity, diag, tridiag, laplace2d or convdiff)"
            ),
        };
        finish(source, parts.next(), s)
    }
}

fn finish(source: ProblemSource, extra: Option<&str>, input: &str) -> anyhow::Result<ProblemSource> {
    if extra.is_some() {
        bail!("too many fields in problem source '{input}'");
    }
    Ok(source)
}

impl fmt::Display for ProblemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemSource::Identity(n) => write!(f, "identity:{n}"),
            ProblemSource::Diagonal(n) => write!(f, "diag:{n}"),
            ProblemSource::Tridiagonal(n) => write!(f, "tridiag:{n}"),
            ProblemSource::Laplace2d(n) => write!(f, "laplace2d:{n}"),
            ProblemSource::ConvectionDiffusion { n, peclet } => write!(f, "convdiff:{n}:{peclet}"),
        }
    }
}

impl ProblemSource {
    /// Number of unknowns.
    pub fn dimension(&self) -> usize {
        match *self {
            ProblemSource::Identity(n)
            | ProblemSource::Diagonal(n)
            | ProblemSource::Tridiagonal(n) => n,
            ProblemSource::Laplace2d(n) | ProblemSource::ConvectionDiffusion { n, .. } => n * n,
        }
    }

    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        match *self {
            ProblemSource::Identity(n) => (0..n).map(|i| (i, i, 1.0)).collect(),
            ProblemSource::Diagonal(n) => (0..n).map(|i| (i, i, (i + 1) as f64)).collect(),
            ProblemSource::Tridiagonal(n) => {
                let mut triplets = Vec::with_capacity(3 * n);
                for i in 0..n {
                    triplets.push((i, i, 2.0));
                    if i > 0 {
                        triplets.push((i, i - 1, -1.0));
                    }
                    if i + 1 < n {
                        triplets.push((i, i + 1, -1.0));
                    }
                }
                triplets
            }
            ProblemSource::Laplace2d(n) => grid_stencil(n, 0.0),
            ProblemSource::ConvectionDiffusion { n, peclet } => {
                let h = 1.0 / (n as f64 + 1.0);
                grid_stencil(n, peclet * h)
            }
        }
    }

    /// Assemble the system with `b = 1` or, with `known_solution`, `b = A * 1`.
    pub fn build(&self, known_solution: bool) -> krylovbench_core::Result<LinearSystem> {
        let n = self.dimension();
        let triplets = self.triplets();
        if known_solution {
            let matrix = SparseMatrix::from_triplets(n, n, &triplets)?;
            LinearSystem::with_known_solution(matrix, &DVector::from_element(n, 1.0))
        } else {
            LinearSystem::from_raw(n, n, &triplets, n, &vec![1.0; n])
        }
    }
}

/// Unknowns of an `n x n` grid, or `None` when its 5-point triplet list
/// cannot be addressed.
fn grid_unknowns(n: usize) -> Option<usize> {
    let triplet_bytes = 5 * std::mem::size_of::<(usize, usize, f64)>();
    n.checked_mul(n)
        .filter(|d| d.checked_mul(triplet_bytes).is_some_and(|b| b <= isize::MAX as usize))
}

/// 5-point stencil on an `n x n` grid with upwinded convection `c` along x.
fn grid_stencil(n: usize, c: f64) -> Vec<(usize, usize, f64)> {
    let mut triplets = Vec::with_capacity(5 * n * n);
    for i in 0..n {
        for j in 0..n {
            let row = i * n + j;
            triplets.push((row, row, 4.0 + c));
            if i > 0 {
                triplets.push((row, row - n, -1.0));
            }
            if i + 1 < n {
                triplets.push((row, row + n, -1.0));
            }
            if j > 0 {
                triplets.push((row, row - 1, -1.0 - c));
            }
            if j + 1 < n {
                triplets.push((row, row + 1, -1.0));
            }
        }
    }
    triplets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sources() {
        assert_eq!("identity:3".parse::<ProblemSource>().unwrap(), ProblemSource::Identity(3));
        assert_eq!("Laplace2D:8".parse::<ProblemSource>().unwrap(), ProblemSource::Laplace2d(8));
        assert_eq!(
            "convdiff:4".parse::<ProblemSource>().unwrap(),
            ProblemSource::ConvectionDiffusion { n: 4, peclet: DEFAULT_PECLET }
        );
        assert_eq!(
            "convdiff:4:50".parse::<ProblemSource>().unwrap(),
            ProblemSource::ConvectionDiffusion { n: 4, peclet: 50.0 }
        );
    }

    #[test]
    fn reject_malformed_sources() {
        assert!("identity".parse::<ProblemSource>().is_err());
        assert!("identity:x".parse::<ProblemSource>().is_err());
        assert!("bogus:3".parse::<ProblemSource>().is_err());
        assert!("tridiag:3:1".parse::<ProblemSource>().is_err());
        assert!("convdiff:3:1:2".parse::<ProblemSource>().is_err());
    }

    #[test]
    fn reject_oversized_grids() {
        assert!("laplace2d:10000000000".parse::<ProblemSource>().is_err());
        assert!("convdiff:4294967296:5".parse::<ProblemSource>().is_err());
        assert!(grid_unknowns(usize::MAX).is_none());
        assert_eq!(grid_unknowns(3), Some(9));
        // 1-D sources are linear in N
        assert!("tridiag:10000000000".parse::<ProblemSource>().is_ok());
    }

    #[test]
    fn laplace_shape() {
        let source = ProblemSource::Laplace2d(3);
        let system = source.build(false).unwrap();
        assert_eq!(system.dim(), 9);
        // 9 diagonal + 2 * 12 grid edges
        assert_eq!(system.matrix().nnz(), 33);
        assert_eq!(system.matrix().get(4, 4), Some(4.0));
    }

    #[test]
    fn known_solution_rhs() {
        let system = ProblemSource::Tridiagonal(4).build(true).unwrap();
        let rhs: Vec<f64> = system.rhs().iter().copied().collect();
        assert_eq!(rhs, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn zero_size_is_an_error() {
        assert!(ProblemSource::Identity(0).build(false).is_err());
    }
}
