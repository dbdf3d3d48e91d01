//! Krylov solver driver for krylovbench.
//!
//! A solve is split across three collaborators:
//!
//! - [`SolveEngine`] - the numerical kernel, obtained per run from an
//!   [`EngineFactory`]. [`BuiltinEngineFactory`] ships the GMRES family
//!   (`gmres`, `fgmres`, `lgmres`, `pgmres`, `pipefgmres`).
//! - [`ConvergenceMonitor`] - records the `(iteration, residual)` callbacks the
//!   engine emits and freezes them into a [`ConvergenceRecord`].
//! - [`KrylovSolverDriver`] - validates a [`SolverConfig`], runs one solve,
//!   releases the engine on every exit path, and produces a [`SolveResult`].
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use krylovbench_solver::{BuiltinEngineFactory, KrylovSolverDriver, SolverConfig};
//!
//! let mut driver = KrylovSolverDriver::new(Arc::new(BuiltinEngineFactory));
//! driver.configure(SolverConfig::new("gmres").with_max_iterations(1000))?;
//! let result = driver.solve(&system)?;
//! println!("{}: {} in {} iterations", result.variant(), result.termination(), result.iterations());
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod gmres;
pub mod linear;
pub mod monitor;
pub mod operator;
pub mod preconditioner;
pub mod result;

pub use config::{
    DEFAULT_DIVERGENCE_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_RESTART, PreconditionerChoice,
    SolverConfig,
};
pub use driver::{CancellationToken, DriverState, KrylovSolverDriver, run_variant};
pub use engine::{
    DivergenceKind, EngineError, EngineFactory, EngineOutcome, EngineSignal, ObserverAction,
    ResidualObserver, SolveEngine,
};
pub use error::{Error, Result};
pub use gmres::{BuiltinEngine, BuiltinEngineFactory, KrylovVariant};
pub use monitor::{ConvergenceMonitor, ConvergenceRecord, ResidualSample};
pub use operator::LinearOperator;
pub use preconditioner::{
    IdentityPreconditioner, Ilu0Preconditioner, IluError, JacobiPreconditioner, Preconditioner,
};
pub use result::{FailureCause, SolveResult, TerminationReason};
