//! krylovbench CLI.
//!
//! Runs several Krylov solver variants on one generated sparse system and
//! prints a comparison. Exits with success if at least one variant produced a
//! usable result.

mod output;
mod problems;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use krylovbench_core::{DVector, LinearSystem};
use krylovbench_runner::{BenchmarkRunner, ExecutionMode};
use krylovbench_solver::linear::solve_direct;
use krylovbench_solver::{BuiltinEngineFactory, SolverConfig};

use problems::ProblemSource;

/// Variants compared when none are given on the command line.
const DEFAULT_VARIANTS: [&str; 6] = ["gmres", "lgmres", "pgmres", "dgmres", "pipefgmres", "fgmres"];

#[derive(Parser)]
#[command(name = "krylovbench")]
#[command(about = "Compare Krylov solver variants on a sparse linear system")]
#[command(version)]
struct Cli {
    /// Problem source: identity:N, diag:N, tridiag:N, laplace2d:N, convdiff:N[:PECLET]
    source: String,

    /// Solver variant to run (repeatable)
    #[arg(short, long = "variant", value_name = "NAME")]
    variants: Vec<String>,

    /// Relative residual tolerance
    #[arg(long, default_value = "1e-8")]
    rtol: f64,

    /// Absolute residual tolerance
    #[arg(long, default_value = "1e-50")]
    atol: f64,

    /// Maximum iterations per variant
    #[arg(long)]
    max_iter: Option<usize>,

    /// Restart length
    #[arg(long)]
    restart: Option<usize>,

    /// Preconditioner: none, jacobi, ilu
    #[arg(long, default_value = "none")]
    pc: String,

    /// Worker threads for running variants concurrently
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Use b = A * ones so the exact solution is known
    #[arg(long)]
    known_solution: bool,

    /// Compare each variant against a direct sparse LU solve
    #[arg(long)]
    verify: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init()?;

    let problem: ProblemSource = cli.source.parse()?;
    let system = problem
        .build(cli.known_solution)
        .with_context(|| format!("failed to assemble '{}'", problem))?;
    log::info!(
        "assembled {} ({} unknowns, nnz = {})",
        problem,
        system.dim(),
        system.matrix().nnz()
    );

    let configs = solver_configs(cli);
    let runner = BenchmarkRunner::new(
        Arc::new(BuiltinEngineFactory),
        ExecutionMode::from_workers(cli.workers),
    );
    let report = runner.run(&system, &configs)?;

    let reference = if cli.verify {
        reference_solution(&system)
    } else {
        None
    };

    if cli.json {
        output::print_json(&problem, &report, reference.as_ref())?;
    } else {
        output::print_table(&problem, &report, reference.as_ref());
    }

    Ok(if report.any_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Direct solve for `--verify`. A failure only drops the error column; the
/// exit code still depends on the Krylov runs alone.
fn reference_solution(system: &LinearSystem) -> Option<DVector<f64>> {
    match solve_direct(system) {
        Ok(x) => Some(x),
        Err(e) => {
            log::warn!("direct reference solve failed, skipping verification: {}", e);
            None
        }
    }
}

/// One configuration per requested variant, sharing every numeric override.
fn solver_configs(cli: &Cli) -> Vec<SolverConfig> {
    let names: Vec<&str> = if cli.variants.is_empty() {
        DEFAULT_VARIANTS.to_vec()
    } else {
        cli.variants.iter().map(String::as_str).collect()
    };

    names
        .into_iter()
        .map(|name| {
            let mut config = SolverConfig::new(name)
                .with_tolerances(cli.rtol, cli.atol)
                .with_preconditioner(cli.pc.as_str());
            if let Some(max_iter) = cli.max_iter {
                config = config.with_max_iterations(max_iter);
            }
            if let Some(restart) = cli.restart {
                config = config.with_restart(restart);
            }
            config
        })
        .collect()
}
