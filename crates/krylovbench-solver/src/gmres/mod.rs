//! Built-in GMRES-family engine.
//!
//! | Variant | Orthogonalization | Directions | Augmentation |
//! |---------|-------------------|------------|--------------|
//! | `gmres` | modified Gram-Schmidt | fixed preconditioner | none |
//! | `fgmres` | modified Gram-Schmidt | flexible (stored `Z`) | none |
//! | `lgmres` | modified Gram-Schmidt | stored `Z` | 2 error approximations |
//! | `pgmres` | classical Gram-Schmidt | fixed preconditioner | none |
//! | `pipefgmres` | classical Gram-Schmidt | flexible (stored `Z`) | none |
//!
//! `pgmres` and `pipefgmres` reproduce the reduced-synchronization projection
//! of their pipelined namesakes (all inner products against the unmodified
//! vector), not their communication overlap.

pub mod helpers;
mod restarted;

use std::fmt;
use std::str::FromStr;

use krylovbench_core::SparseMatrix;

use crate::config::SolverConfig;
use crate::engine::{EngineError, EngineFactory, EngineOutcome, ResidualObserver, SolveEngine};
use crate::preconditioner::build_preconditioner;

pub use restarted::{GmresParams, Orthogonalization, solve_restarted};

/// Error-approximation vectors kept between LGMRES cycles.
const LGMRES_AUGMENTATION: usize = 2;

/// Krylov methods the built-in engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KrylovVariant {
    Gmres,
    Fgmres,
    Lgmres,
    Pgmres,
    PipeFgmres,
}

impl KrylovVariant {
    pub const ALL: [KrylovVariant; 5] = [
        KrylovVariant::Gmres,
        KrylovVariant::Fgmres,
        KrylovVariant::Lgmres,
        KrylovVariant::Pgmres,
        KrylovVariant::PipeFgmres,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KrylovVariant::Gmres => "gmres",
            KrylovVariant::Fgmres => "fgmres",
            KrylovVariant::Lgmres => "lgmres",
            KrylovVariant::Pgmres => "pgmres",
            KrylovVariant::PipeFgmres => "pipefgmres",
        }
    }

    /// Kernel parameters for this variant under `config`.
    pub fn params(self, config: &SolverConfig) -> GmresParams {
        let (orthogonalization, flexible, augmentation) = match self {
            KrylovVariant::Gmres => (Orthogonalization::Modified, false, 0),
            KrylovVariant::Fgmres => (Orthogonalization::Modified, true, 0),
            KrylovVariant::Lgmres => (Orthogonalization::Modified, false, LGMRES_AUGMENTATION),
            KrylovVariant::Pgmres => (Orthogonalization::Classical, false, 0),
            KrylovVariant::PipeFgmres => (Orthogonalization::Classical, true, 0),
        };
        GmresParams {
            restart: config.restart_length(),
            max_iterations: config.iteration_cap(),
            relative_tolerance: config.relative_tolerance,
            absolute_tolerance: config.absolute_tolerance,
            divergence_tolerance: config.divergence_tolerance,
            orthogonalization,
            flexible,
            augmentation,
        }
    }
}

impl fmt::Display for KrylovVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KrylovVariant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        KrylovVariant::ALL
            .into_iter()
            .find(|v| v.name() == lower)
            .ok_or_else(|| EngineError::UnknownVariant(s.to_string()))
    }
}

/// In-process engine handle for the GMRES family.
#[derive(Debug, Default)]
pub struct BuiltinEngine {
    released: bool,
}

impl BuiltinEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SolveEngine for BuiltinEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    fn solve(
        &mut self,
        matrix: &SparseMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        observer: &mut dyn ResidualObserver,
    ) -> Result<EngineOutcome, EngineError> {
        if self.released {
            return Err(EngineError::Released);
        }
        let variant: KrylovVariant = config.variant.parse()?;
        if !matrix.is_square() {
            return Err(EngineError::NotSquare {
                rows: matrix.rows(),
                cols: matrix.cols(),
            });
        }
        if rhs.len() != matrix.rows() {
            return Err(EngineError::DimensionMismatch {
                expected: matrix.rows(),
                actual: rhs.len(),
            });
        }

        let precond = build_preconditioner(&config.preconditioner, matrix)?;
        let params = variant.params(config);
        log::debug!(
            "{}: n={}, nnz={}, pc={}, restart={}, max_iter={}",
            variant,
            matrix.rows(),
            matrix.nnz(),
            precond.name(),
            params.restart,
            params.max_iterations
        );

        Ok(solve_restarted(matrix, precond.as_ref(), rhs, &params, observer))
    }

    fn release(&mut self) -> Result<(), EngineError> {
        if self.released {
            return Err(EngineError::Released);
        }
        self.released = true;
        Ok(())
    }
}

/// Hands out a fresh [`BuiltinEngine`] per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngineFactory;

impl EngineFactory for BuiltinEngineFactory {
    fn acquire(&self) -> Result<Box<dyn SolveEngine>, EngineError> {
        Ok(Box::new(BuiltinEngine::new()))
    }
}
