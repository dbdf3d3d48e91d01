//! Benchmark runner for krylovbench.
//!
//! Runs an ordered list of [`SolverConfig`]s against one shared
//! [`LinearSystem`] and collects one [`SolveResult`] per configuration, in
//! input order:
//!
//! - every run borrows the same system, which nothing mutates;
//! - every run gets a fresh driver, monitor, and engine handle;
//! - a failed run is recorded and the batch moves on.
//!
//! With the `parallel` feature, [`ExecutionMode::Parallel`] spreads the runs
//! over a dedicated rayon pool sized by an explicit worker count.
//!
//! [`SolverConfig`]: krylovbench_solver::SolverConfig
//! [`LinearSystem`]: krylovbench_core::LinearSystem
//! [`SolveResult`]: krylovbench_solver::SolveResult

pub mod error;
pub mod report;
pub mod runner;

pub use error::{Result, RunnerError};
pub use report::{BenchmarkReport, ReportSummary, VariantSummary};
pub use runner::{BenchmarkRunner, ExecutionMode};
