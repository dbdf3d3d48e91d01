//! Solver configuration.

use serde::Serialize;

use crate::error::{Error, Result};

/// Iteration cap applied when [`SolverConfig::max_iterations`] is unset.
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Krylov subspace dimension before restart.
pub const DEFAULT_RESTART: usize = 30;

/// A run is declared diverged once its residual exceeds this multiple of the initial residual.
pub const DEFAULT_DIVERGENCE_TOLERANCE: f64 = 1e5;

/// Preconditioner selection, passed to the engine as an opaque name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum PreconditionerChoice {
    #[default]
    None,
    /// Engine-specific preconditioner name, stored lowercase.
    Named(String),
}

impl PreconditionerChoice {
    /// Parse a user-supplied name. `""` and `"none"` select no preconditioner.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name == "none" {
            Self::None
        } else {
            Self::Named(name)
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Named(name) => name,
        }
    }
}

impl From<&str> for PreconditionerChoice {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

/// Configuration for one solver variant.
///
/// Built with [`SolverConfig::new`] and the `with_*` methods. Validation runs
/// when the config is handed to a driver (or eagerly via
/// [`SolverConfig::try_new`]), so a benchmark batch can carry a malformed
/// entry and report it as a failed arm rather than refusing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverConfig {
    /// Krylov method name, e.g. `"gmres"`, `"fgmres"`, `"lgmres"`.
    pub variant: String,
    /// Relative residual tolerance (against the initial residual).
    pub relative_tolerance: f64,
    /// Absolute residual tolerance.
    pub absolute_tolerance: f64,
    /// Iteration cap; `None` means [`DEFAULT_MAX_ITERATIONS`].
    pub max_iterations: Option<usize>,
    pub preconditioner: PreconditionerChoice,
    /// Restart length; `None` means [`DEFAULT_RESTART`].
    pub restart: Option<usize>,
    /// Divergence factor on the initial residual.
    pub divergence_tolerance: f64,
}

impl SolverConfig {
    /// Configuration with default tolerances (`rtol = 1e-8`, `atol = 1e-50`).
    pub fn new(variant: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-50,
            max_iterations: None,
            preconditioner: PreconditionerChoice::None,
            restart: None,
            divergence_tolerance: DEFAULT_DIVERGENCE_TOLERANCE,
        }
    }

    /// Construct and validate in one step.
    pub fn try_new(
        variant: impl Into<String>,
        relative_tolerance: f64,
        absolute_tolerance: f64,
        max_iterations: Option<usize>,
    ) -> Result<Self> {
        let config = Self {
            relative_tolerance,
            absolute_tolerance,
            max_iterations,
            ..Self::new(variant)
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_relative_tolerance(mut self, rtol: f64) -> Self {
        self.relative_tolerance = rtol;
        self
    }

    pub fn with_absolute_tolerance(mut self, atol: f64) -> Self {
        self.absolute_tolerance = atol;
        self
    }

    pub fn with_tolerances(self, rtol: f64, atol: f64) -> Self {
        self.with_relative_tolerance(rtol).with_absolute_tolerance(atol)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Clear the iteration cap so [`DEFAULT_MAX_ITERATIONS`] applies.
    pub fn without_max_iterations(mut self) -> Self {
        self.max_iterations = None;
        self
    }

    pub fn with_preconditioner(mut self, preconditioner: impl Into<PreconditionerChoice>) -> Self {
        self.preconditioner = preconditioner.into();
        self
    }

    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = Some(restart);
        self
    }

    pub fn with_divergence_tolerance(mut self, dtol: f64) -> Self {
        self.divergence_tolerance = dtol;
        self
    }

    /// Check that the configuration gives a decidable stopping rule.
    pub fn validate(&self) -> Result<()> {
        if self.variant.trim().is_empty() {
            return Err(Error::InvalidConfiguration("variant name is empty".into()));
        }
        for (name, tol) in [
            ("relative tolerance", self.relative_tolerance),
            ("absolute tolerance", self.absolute_tolerance),
        ] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "{name} must be finite and non-negative, got {tol}"
                )));
            }
        }
        if self.relative_tolerance == 0.0
            && self.absolute_tolerance == 0.0
            && self.max_iterations.is_none()
        {
            return Err(Error::InvalidConfiguration(
                "both tolerances are zero and no iteration limit is set".into(),
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(Error::InvalidConfiguration(
                "max iterations must be positive".into(),
            ));
        }
        if self.restart == Some(0) {
            return Err(Error::InvalidConfiguration(
                "restart length must be positive".into(),
            ));
        }
        if self.divergence_tolerance.is_nan() || self.divergence_tolerance <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "divergence tolerance must be positive, got {}",
                self.divergence_tolerance
            )));
        }
        Ok(())
    }

    /// Effective iteration cap.
    pub fn iteration_cap(&self) -> usize {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    /// Effective restart length.
    pub fn restart_length(&self) -> usize {
        self.restart.unwrap_or(DEFAULT_RESTART)
    }

    /// Residual threshold `max(rtol * r0, atol)` for an initial residual `r0`.
    pub fn stopping_threshold(&self, initial_residual: f64) -> f64 {
        (self.relative_tolerance * initial_residual).max(self.absolute_tolerance)
    }
}
