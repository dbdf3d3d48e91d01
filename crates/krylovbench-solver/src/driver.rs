//! Driver for a single solver run.
//!
//! ```text
//! Created --configure--> Configured --solve--> Running --> Converged            --> Finalized
//!                                                      \-> MaxIterationsReached --/
//!                                                      \-> SolverDiverged       --/
//!                                                      \-> SolverFailed         --/
//! ```
//!
//! A driver is single-use. The engine handle it acquires is released on every
//! exit path, including panics unwinding through the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use krylovbench_core::LinearSystem;
use nalgebra::DVector;
use serde::Serialize;

use crate::config::SolverConfig;
use crate::engine::{
    EngineFactory, EngineSignal, ObserverAction, ResidualObserver, SolveEngine,
};
use crate::error::{Error, Result};
use crate::monitor::ConvergenceMonitor;
use crate::result::{FailureCause, SolveResult, TerminationReason};

/// Relative slack when checking a converged trace against the stopping threshold.
const THRESHOLD_SLACK: f64 = 1e-12;

/// Lifecycle states of a [`KrylovSolverDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Created,
    Configured,
    Running,
    Converged,
    MaxIterationsReached,
    SolverDiverged,
    SolverFailed,
    Finalized,
}

impl DriverState {
    fn terminal(reason: &TerminationReason) -> Self {
        match reason {
            TerminationReason::Converged => DriverState::Converged,
            TerminationReason::MaxIterationsReached => DriverState::MaxIterationsReached,
            TerminationReason::SolverDiverged(_) => DriverState::SolverDiverged,
            TerminationReason::SolverFailed(_) => DriverState::SolverFailed,
        }
    }
}

/// Shared flag for cancelling in-flight runs.
///
/// Cloning shares the flag. A cancelled run ends as
/// `SolverFailed(Cancelled)` at its next residual callback.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases the engine exactly once, on drop if not before.
struct EngineHandle {
    engine: Box<dyn SolveEngine>,
    released: bool,
}

impl EngineHandle {
    fn new(engine: Box<dyn SolveEngine>) -> Self {
        Self {
            engine,
            released: false,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.engine.release() {
            log::warn!("failed to release engine '{}': {}", self.engine.name(), err);
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Feeds engine callbacks into a [`ConvergenceMonitor`].
struct MonitorObserver<'a> {
    variant: &'a str,
    monitor: ConvergenceMonitor,
    cancel: &'a CancellationToken,
    fault: Option<Error>,
}

impl ResidualObserver for MonitorObserver<'_> {
    fn on_residual(&mut self, iteration: usize, residual_norm: f64) -> ObserverAction {
        if self.fault.is_some() || self.cancel.is_cancelled() {
            return ObserverAction::Abort;
        }
        if let Err(err) = self.monitor.observe(iteration, residual_norm) {
            log::warn!("{}: rejected residual callback: {}", self.variant, err);
            self.fault = Some(err);
            return ObserverAction::Abort;
        }
        ObserverAction::Continue
    }
}

/// Runs one solver variant on one linear system.
pub struct KrylovSolverDriver {
    factory: Arc<dyn EngineFactory>,
    config: Option<SolverConfig>,
    state: DriverState,
    cancel: CancellationToken,
}

impl KrylovSolverDriver {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            config: None,
            state: DriverState::Created,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `cancel` during the run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> Option<&SolverConfig> {
        self.config.as_ref()
    }

    /// Validate and store `config`. The driver stays `Created` if validation fails.
    pub fn configure(&mut self, config: SolverConfig) -> Result<()> {
        self.expect_state(DriverState::Created)?;
        config.validate()?;
        self.config = Some(config);
        self.transition(DriverState::Configured);
        Ok(())
    }

    /// Run the configured variant on `system`.
    ///
    /// Only lifecycle misuse is an `Err`. Engine failures, malformed callbacks
    /// and cancellation all come back as a `SolverFailed` result.
    pub fn solve(&mut self, system: &LinearSystem) -> Result<SolveResult> {
        self.expect_state(DriverState::Configured)?;
        let Some(config) = self.config.clone() else {
            return Err(Error::InvalidState {
                expected: DriverState::Configured,
                actual: self.state,
            });
        };

        self.transition(DriverState::Running);
        let result = self.execute(&config, system);
        self.transition(DriverState::terminal(result.termination()));
        self.transition(DriverState::Finalized);
        Ok(result)
    }

    fn execute(&self, config: &SolverConfig, system: &LinearSystem) -> SolveResult {
        let variant = config.variant.as_str();
        if self.cancel.is_cancelled() {
            return SolveResult::failed(variant, system, FailureCause::Cancelled);
        }

        let mut handle = match self.factory.acquire() {
            Ok(engine) => EngineHandle::new(engine),
            Err(err) => {
                log::error!("{variant}: failed to acquire engine: {err}");
                return SolveResult::failed(variant, system, FailureCause::Engine(err.to_string()));
            }
        };

        let mut observer = MonitorObserver {
            variant,
            monitor: ConvergenceMonitor::with_capacity(config.iteration_cap().min(1024)),
            cancel: &self.cancel,
            fault: None,
        };

        let start = Instant::now();
        let outcome = handle.engine.solve(
            system.matrix(),
            system.rhs().as_slice(),
            config,
            &mut observer,
        );
        let elapsed = start.elapsed();
        handle.release();

        let MonitorObserver { monitor, fault, .. } = observer;
        let failed = |cause: FailureCause| {
            let mut result = SolveResult::failed(variant, system, cause);
            result.elapsed = elapsed;
            result
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("{variant}: engine failed: {err}");
                return failed(FailureCause::Engine(err.to_string()));
            }
        };
        if let Some(fault) = fault {
            return failed(FailureCause::MalformedCallback(fault.to_string()));
        }

        let convergence = monitor.finalize();
        let mut convergence_unconfirmed = false;
        let termination = match outcome.signal {
            EngineSignal::ToleranceSatisfied => {
                let threshold = config.stopping_threshold(outcome.initial_residual_norm);
                if let Some(last) = convergence.last() {
                    if last.residual_norm > threshold * (1.0 + THRESHOLD_SLACK) {
                        log::warn!(
                            "{variant}: engine reported convergence at residual {:.3e} above threshold {:.3e}",
                            last.residual_norm,
                            threshold
                        );
                        convergence_unconfirmed = true;
                    }
                }
                TerminationReason::Converged
            }
            EngineSignal::IterationLimit => TerminationReason::MaxIterationsReached,
            EngineSignal::Diverged(kind) => TerminationReason::SolverDiverged(kind),
            EngineSignal::Aborted if self.cancel.is_cancelled() => {
                log::info!("{variant}: cancelled after {} iterations", outcome.iterations);
                return failed(FailureCause::Cancelled);
            }
            EngineSignal::Aborted => {
                return failed(FailureCause::Engine(
                    "engine stopped without a request".into(),
                ));
            }
        };

        if outcome.solution.len() != system.matrix().cols() {
            return failed(FailureCause::Engine(format!(
                "solution has length {}, expected {}",
                outcome.solution.len(),
                system.matrix().cols()
            )));
        }
        let solution = DVector::from_vec(outcome.solution);
        let true_residual_norm = match system.residual_norm(&solution) {
            Ok(norm) => norm,
            Err(err) => return failed(FailureCause::Engine(err.to_string())),
        };

        log::debug!(
            "{variant}: {} after {} iterations in {:.3?} (true residual {:.3e})",
            termination,
            outcome.iterations,
            elapsed,
            true_residual_norm
        );

        SolveResult {
            variant: variant.to_string(),
            termination,
            solution,
            convergence,
            iterations: outcome.iterations,
            elapsed,
            initial_residual_norm: outcome.initial_residual_norm,
            true_residual_norm,
            convergence_unconfirmed,
        }
    }

    fn expect_state(&self, expected: DriverState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: DriverState) {
        log::trace!("driver: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Configure a fresh driver and run it. Never fails: every problem is folded
/// into a `SolverFailed` result so one bad variant cannot stop a benchmark.
pub fn run_variant(
    factory: Arc<dyn EngineFactory>,
    system: &LinearSystem,
    config: SolverConfig,
    cancel: &CancellationToken,
) -> SolveResult {
    let variant = config.variant.clone();
    let mut driver = KrylovSolverDriver::new(factory).with_cancellation(cancel.clone());

    if let Err(err) = driver.configure(config) {
        log::warn!("{variant}: {err}");
        let msg = match err {
            Error::InvalidConfiguration(msg) => msg,
            other => other.to_string(),
        };
        return SolveResult::failed(variant, system, FailureCause::InvalidConfiguration(msg));
    }

    match driver.solve(system) {
        Ok(result) => result,
        Err(err) => {
            log::error!("{variant}: {err}");
            SolveResult::failed(variant, system, FailureCause::Engine(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use krylovbench_core::SparseMatrix;

    use crate::engine::{DivergenceKind, EngineError, EngineOutcome};
    use crate::gmres::BuiltinEngineFactory;

    /// Scripted engine: replays fixed callbacks, then returns `signal`.
    struct ScriptedEngine {
        callbacks: Vec<(usize, f64)>,
        signal: EngineSignal,
        fail: Option<EngineError>,
        fail_release: bool,
        releases: Arc<AtomicUsize>,
    }

    impl SolveEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn solve(
            &mut self,
            matrix: &krylovbench_core::SparseMatrix,
            _rhs: &[f64],
            _config: &SolverConfig,
            observer: &mut dyn ResidualObserver,
        ) -> std::result::Result<EngineOutcome, EngineError> {
            if let Some(err) = self.fail.clone() {
                return Err(err);
            }
            let mut iterations = 0;
            let mut signal = self.signal;
            for &(iteration, residual) in &self.callbacks {
                iterations += 1;
                if observer.on_residual(iteration, residual) == ObserverAction::Abort {
                    signal = EngineSignal::Aborted;
                    break;
                }
            }
            Ok(EngineOutcome {
                solution: vec![0.5; matrix.cols()],
                iterations,
                initial_residual_norm: 2.0,
                signal,
            })
        }

        fn release(&mut self) -> std::result::Result<(), EngineError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                Err(EngineError::Release("device busy".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone)]
    struct ScriptedFactory {
        callbacks: Vec<(usize, f64)>,
        signal: EngineSignal,
        fail: Option<EngineError>,
        fail_release: bool,
        unavailable: bool,
        releases: Arc<AtomicUsize>,
    }

    impl ScriptedFactory {
        fn new(callbacks: Vec<(usize, f64)>, signal: EngineSignal) -> Self {
            Self {
                callbacks,
                signal,
                fail: None,
                fail_release: false,
                unavailable: false,
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn released(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    impl EngineFactory for ScriptedFactory {
        fn acquire(&self) -> std::result::Result<Box<dyn SolveEngine>, EngineError> {
            if self.unavailable {
                return Err(EngineError::Unavailable("no devices".into()));
            }
            Ok(Box::new(ScriptedEngine {
                callbacks: self.callbacks.clone(),
                signal: self.signal,
                fail: self.fail.clone(),
                fail_release: self.fail_release,
                releases: self.releases.clone(),
            }))
        }
    }

    fn system() -> LinearSystem {
        LinearSystem::with_unit_rhs(SparseMatrix::identity(4).unwrap())
    }

    fn run(factory: &ScriptedFactory) -> SolveResult {
        let mut driver = KrylovSolverDriver::new(Arc::new(factory.clone()));
        driver.configure(SolverConfig::new("scripted")).unwrap();
        let result = driver.solve(&system()).unwrap();
        assert_eq!(driver.state(), DriverState::Finalized);
        result
    }

    #[test]
    fn lifecycle_states() {
        let mut driver = KrylovSolverDriver::new(Arc::new(BuiltinEngineFactory));
        assert_eq!(driver.state(), DriverState::Created);
        assert!(matches!(
            driver.solve(&system()),
            Err(Error::InvalidState {
                expected: DriverState::Configured,
                actual: DriverState::Created
            })
        ));

        driver.configure(SolverConfig::new("gmres")).unwrap();
        assert_eq!(driver.state(), DriverState::Configured);
        assert!(driver.configure(SolverConfig::new("gmres")).is_err());

        let result = driver.solve(&system()).unwrap();
        assert!(result.is_converged());
        assert_eq!(driver.state(), DriverState::Finalized);
        assert!(driver.solve(&system()).is_err());
    }

    #[test]
    fn invalid_config_keeps_driver_created() {
        let mut driver = KrylovSolverDriver::new(Arc::new(BuiltinEngineFactory));
        let bad = SolverConfig::new("gmres").with_tolerances(0.0, 0.0);
        assert!(matches!(driver.configure(bad), Err(Error::InvalidConfiguration(_))));
        assert_eq!(driver.state(), DriverState::Created);
        assert!(driver.config().is_none());
    }

    #[test]
    fn converged_run_records_trace() {
        let factory = ScriptedFactory::new(
            vec![(1, 1.0), (2, 1e-3), (3, 1e-9)],
            EngineSignal::ToleranceSatisfied,
        );
        let result = run(&factory);

        assert_eq!(result.termination(), &TerminationReason::Converged);
        assert_eq!(result.iterations(), 3);
        assert_eq!(result.convergence().iterations(), vec![1, 2, 3]);
        assert_eq!(result.final_residual_norm(), 1e-9);
        // x = 0.5 * ones, b = ones, A = I
        assert!((result.true_residual_norm() - 1.0).abs() < 1e-12);
        assert_eq!(factory.released(), 1);
    }

    #[test]
    fn convergence_above_threshold_is_flagged() {
        // r0 = ||ones(4)|| = 2, so the default threshold is 2e-8
        let factory = ScriptedFactory::new(vec![(1, 1.0), (2, 0.5)], EngineSignal::ToleranceSatisfied);
        let result = run(&factory);

        assert_eq!(result.termination(), &TerminationReason::Converged);
        assert!(result.convergence_unconfirmed());
        assert_eq!(result.final_residual_norm(), 0.5);

        let factory = ScriptedFactory::new(vec![(1, 1e-9)], EngineSignal::ToleranceSatisfied);
        assert!(!run(&factory).convergence_unconfirmed());
    }

    #[test]
    fn signals_map_to_termination() {
        let cases = [
            (EngineSignal::IterationLimit, TerminationReason::MaxIterationsReached),
            (
                EngineSignal::Diverged(DivergenceKind::ResidualGrowth),
                TerminationReason::SolverDiverged(DivergenceKind::ResidualGrowth),
            ),
        ];
        for (signal, expected) in cases {
            let factory = ScriptedFactory::new(vec![(1, 1.0)], signal);
            let result = run(&factory);
            assert_eq!(result.termination(), &expected);
            assert_eq!(result.convergence().len(), 1);
        }
    }

    #[test]
    fn non_monotonic_callback_fails_run() {
        let factory = ScriptedFactory::new(
            vec![(1, 1.0), (2, 0.5), (2, 0.25), (3, 0.1)],
            EngineSignal::ToleranceSatisfied,
        );
        let result = run(&factory);

        assert!(matches!(
            result.termination(),
            TerminationReason::SolverFailed(FailureCause::MalformedCallback(_))
        ));
        assert!(result.convergence().is_empty());
        assert_eq!(factory.released(), 1);
    }

    #[test]
    fn nan_callback_fails_run() {
        let factory = ScriptedFactory::new(vec![(1, f64::NAN)], EngineSignal::ToleranceSatisfied);
        let result = run(&factory);
        assert!(matches!(
            result.termination(),
            TerminationReason::SolverFailed(FailureCause::MalformedCallback(_))
        ));
    }

    #[test]
    fn engine_error_fails_run_and_releases() {
        let mut factory = ScriptedFactory::new(vec![], EngineSignal::ToleranceSatisfied);
        factory.fail = Some(EngineError::UnknownVariant("scripted".into()));
        let result = run(&factory);

        assert!(matches!(
            result.termination(),
            TerminationReason::SolverFailed(FailureCause::Engine(_))
        ));
        assert_eq!(factory.released(), 1);
    }

    #[test]
    fn acquire_failure_fails_run() {
        let mut factory = ScriptedFactory::new(vec![], EngineSignal::ToleranceSatisfied);
        factory.unavailable = true;
        let result = run(&factory);

        assert!(result.is_failed());
        assert_eq!(factory.released(), 0);
    }

    #[test]
    fn release_failure_is_not_fatal() {
        let mut factory = ScriptedFactory::new(vec![(1, 0.0)], EngineSignal::ToleranceSatisfied);
        factory.fail_release = true;
        let result = run(&factory);

        assert!(result.is_converged());
        assert_eq!(factory.released(), 1);
    }

    #[test]
    fn zero_callbacks_is_valid() {
        let factory = ScriptedFactory::new(vec![], EngineSignal::ToleranceSatisfied);
        let result = run(&factory);

        assert!(result.is_converged());
        assert!(result.convergence().is_empty());
        assert_eq!(result.final_residual_norm(), 2.0);
    }

    #[test]
    fn cancelled_before_solve() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let factory = ScriptedFactory::new(vec![(1, 1.0)], EngineSignal::ToleranceSatisfied);
        let result = run_variant(
            Arc::new(factory.clone()),
            &system(),
            SolverConfig::new("scripted"),
            &cancel,
        );

        assert_eq!(
            result.termination(),
            &TerminationReason::SolverFailed(FailureCause::Cancelled)
        );
        assert_eq!(factory.released(), 0);
    }

    #[test]
    fn run_variant_folds_config_errors() {
        let result = run_variant(
            Arc::new(BuiltinEngineFactory),
            &system(),
            SolverConfig::new("gmres").with_max_iterations(0),
            &CancellationToken::new(),
        );
        assert!(matches!(
            result.termination(),
            TerminationReason::SolverFailed(FailureCause::InvalidConfiguration(_))
        ));
        assert_eq!(result.variant(), "gmres");
    }

    #[test]
    fn builtin_identity_solve() {
        let system = LinearSystem::new(
            SparseMatrix::identity(3).unwrap(),
            DVector::from_vec(vec![1.0, 2.0, 3.0]),
        )
        .unwrap();
        let config = SolverConfig::new("gmres").with_tolerances(1e-6, 1e-12);
        let result = run_variant(
            Arc::new(BuiltinEngineFactory),
            &system,
            config,
            &CancellationToken::new(),
        );

        assert!(result.is_converged());
        assert!(result.true_residual_norm() < 1e-10);
        assert!(result.final_residual_norm() <= 1e-12);
        for (x, expected) in result.solution().iter().zip([1.0, 2.0, 3.0]) {
            assert!((x - expected).abs() < 1e-10);
        }
    }
}
