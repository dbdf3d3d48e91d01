//! Report printing.

use anyhow::Result;
use krylovbench_core::DVector;
use krylovbench_runner::{BenchmarkReport, ReportSummary};
use krylovbench_solver::SolveResult;
use serde::Serialize;

use crate::problems::ProblemSource;

#[derive(Serialize)]
struct JsonReport {
    problem: String,
    #[serde(flatten)]
    summary: ReportSummary,
    /// Max-norm error of each variant against the direct solve, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_errors: Option<Vec<Option<f64>>>,
}

/// Max-norm distance from the direct solution, or `None` for failed runs.
fn reference_error(result: &SolveResult, reference: &DVector<f64>) -> Option<f64> {
    if result.is_failed() {
        return None;
    }
    Some((result.solution() - reference).amax())
}

/// Print the report as pretty JSON.
pub fn print_json(
    problem: &ProblemSource,
    report: &BenchmarkReport,
    reference: Option<&DVector<f64>>,
) -> Result<()> {
    let json = JsonReport {
        problem: problem.to_string(),
        summary: report.summary(),
        reference_errors: reference
            .map(|x| report.results().iter().map(|r| reference_error(r, x)).collect()),
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Print the report as a table, followed by failure causes.
pub fn print_table(
    problem: &ProblemSource,
    report: &BenchmarkReport,
    reference: Option<&DVector<f64>>,
) {
    println!(
        "Problem: {} ({}x{}, nnz = {})",
        problem,
        report.rows(),
        report.cols(),
        report.nnz()
    );
    println!();

    print!(
        "{:<12}{:>16}{:>8}{:>12}{:>14}{:>14}",
        "Variant", "Status", "Iters", "Time (ms)", "Residual", "True resid"
    );
    if reference.is_some() {
        print!("{:>14}", "Error");
    }
    println!();

    let width = 76 + if reference.is_some() { 14 } else { 0 };
    println!("{}", "-".repeat(width));

    for result in report.results() {
        print!(
            "{:<12}{:>16}{:>8}{:>12.3}{:>14.4e}{:>14.4e}",
            result.variant(),
            result.termination().label(),
            result.iterations(),
            result.elapsed().as_secs_f64() * 1e3,
            result.final_residual_norm(),
            result.true_residual_norm()
        );
        if let Some(x) = reference {
            match reference_error(result, x) {
                Some(err) => print!("{:>14.4e}", err),
                None => print!("{:>14}", "-"),
            }
        }
        println!();
    }
    println!();

    for result in report.results() {
        if !result.is_converged() {
            println!("  {}: {}", result.variant(), result.termination());
        }
    }

    match report.fastest_converged() {
        Some(best) => println!(
            "Fastest converged: {} ({:.3} ms, {} iterations)",
            best.variant(),
            best.elapsed().as_secs_f64() * 1e3,
            best.iterations()
        ),
        None => println!("No variant converged."),
    }
}
