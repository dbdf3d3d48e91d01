//! Variant scheduling.

use std::sync::Arc;

use krylovbench_core::LinearSystem;
use krylovbench_solver::{CancellationToken, EngineFactory, SolveResult, SolverConfig, run_variant};

use crate::error::{Result, RunnerError};
use crate::report::BenchmarkReport;

/// How the runner schedules variant runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One run at a time, in input order.
    #[default]
    Sequential,
    /// Runs spread over `workers` threads. Falls back to sequential when the
    /// crate is built without the `parallel` feature.
    Parallel { workers: usize },
}

impl ExecutionMode {
    /// `Sequential` for one worker, `Parallel` otherwise.
    pub fn from_workers(workers: usize) -> Self {
        if workers <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel { workers }
        }
    }
}

/// Runs a batch of solver configurations against one linear system.
pub struct BenchmarkRunner {
    factory: Arc<dyn EngineFactory>,
    mode: ExecutionMode,
    cancel: CancellationToken,
}

impl BenchmarkRunner {
    pub fn new(factory: Arc<dyn EngineFactory>, mode: ExecutionMode) -> Self {
        Self {
            factory,
            mode,
            cancel: CancellationToken::new(),
        }
    }

    /// Share `cancel` with every run in the batch.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Token that cancels the remaining and in-flight runs of this runner.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every configuration on `system`.
    ///
    /// The report holds exactly one result per configuration, in input order.
    /// Only scheduling problems (an unusable worker pool) are returned as
    /// errors.
    pub fn run(&self, system: &LinearSystem, configs: &[SolverConfig]) -> Result<BenchmarkReport> {
        let matrix = system.matrix();
        log::info!(
            "benchmarking {} variant(s) on {}x{} system (nnz={}, {:?})",
            configs.len(),
            matrix.rows(),
            matrix.cols(),
            matrix.nnz(),
            self.mode
        );

        let results = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(system, configs),
            ExecutionMode::Parallel { workers } => self.run_parallel(system, configs, workers)?,
        };
        debug_assert_eq!(results.len(), configs.len());

        let report = BenchmarkReport::new(system, results);
        if !report.any_succeeded() && !report.is_empty() {
            log::error!("every variant failed");
        }
        Ok(report)
    }

    fn run_sequential(&self, system: &LinearSystem, configs: &[SolverConfig]) -> Vec<SolveResult> {
        configs
            .iter()
            .enumerate()
            .map(|(index, config)| self.run_one(index, configs.len(), system, config))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(
        &self,
        system: &LinearSystem,
        configs: &[SolverConfig],
        workers: usize,
    ) -> Result<Vec<SolveResult>> {
        use rayon::prelude::*;

        if workers == 0 {
            return Err(RunnerError::NoWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("krylovbench-{i}"))
            .build()
            .map_err(|e| RunnerError::ThreadPool(e.to_string()))?;

        // Indexed collect keeps input order regardless of completion order.
        Ok(pool.install(|| {
            configs
                .par_iter()
                .enumerate()
                .map(|(index, config)| self.run_one(index, configs.len(), system, config))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(
        &self,
        system: &LinearSystem,
        configs: &[SolverConfig],
        workers: usize,
    ) -> Result<Vec<SolveResult>> {
        if workers == 0 {
            return Err(RunnerError::NoWorkers);
        }
        log::warn!("built without the `parallel` feature, running {workers}-worker batch sequentially");
        Ok(self.run_sequential(system, configs))
    }

    fn run_one(
        &self,
        index: usize,
        total: usize,
        system: &LinearSystem,
        config: &SolverConfig,
    ) -> SolveResult {
        log::info!("[{}/{}] {}", index + 1, total, config.variant);
        let result = run_variant(self.factory.clone(), system, config.clone(), &self.cancel);
        log::info!(
            "[{}/{}] {}: {} ({} iterations, {:.3?}, residual {:.3e})",
            index + 1,
            total,
            result.variant(),
            result.termination(),
            result.iterations(),
            result.elapsed(),
            result.final_residual_norm()
        );
        result
    }
}
