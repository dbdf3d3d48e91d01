//! Convergence history recording.
//!
//! A [`ConvergenceMonitor`] is a passive recorder fed by the engine's residual
//! callbacks. It rejects malformed callback sequences (an iteration index that
//! fails to increase, a NaN or negative norm) instead of storing them, and is
//! consumed by [`ConvergenceMonitor::finalize`], which yields the frozen
//! [`ConvergenceRecord`]. There is no reset; each solve gets a fresh monitor.

use serde::Serialize;

use crate::error::{Error, Result};

/// One `(iteration, residual norm)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualSample {
    pub iteration: usize,
    pub residual_norm: f64,
}

/// Append-only recorder for one solve.
#[derive(Debug, Default)]
pub struct ConvergenceMonitor {
    samples: Vec<ResidualSample>,
}

impl ConvergenceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Record one callback.
    ///
    /// `iteration` must be strictly greater than the previous one and
    /// `residual_norm` must be non-negative (infinity is kept so a divergent
    /// trace stays visible).
    pub fn observe(&mut self, iteration: usize, residual_norm: f64) -> Result<()> {
        if let Some(last) = self.samples.last() {
            if iteration <= last.iteration {
                return Err(Error::NonMonotonicIteration {
                    previous: last.iteration,
                    got: iteration,
                });
            }
        }
        if residual_norm.is_nan() || residual_norm < 0.0 {
            return Err(Error::InvalidResidual {
                iteration,
                value: residual_norm,
            });
        }
        self.samples.push(ResidualSample {
            iteration,
            residual_norm,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent observation.
    pub fn last(&self) -> Option<&ResidualSample> {
        self.samples.last()
    }

    /// Freeze the history.
    pub fn finalize(self) -> ConvergenceRecord {
        ConvergenceRecord {
            samples: self.samples,
        }
    }
}

/// Frozen convergence history, strictly increasing in iteration index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConvergenceRecord {
    samples: Vec<ResidualSample>,
}

impl ConvergenceRecord {
    /// A record with no samples (zero callbacks, or a failed run).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[ResidualSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&ResidualSample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&ResidualSample> {
        self.samples.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResidualSample> {
        self.samples.iter()
    }

    /// Iteration indices, in order.
    pub fn iterations(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.iteration).collect()
    }

    /// Residual norms, in order.
    pub fn residual_norms(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.residual_norm).collect()
    }

    /// True if no sample is larger than its predecessor.
    pub fn is_non_increasing(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[1].residual_norm <= w[0].residual_norm)
    }

    /// Final residual divided by `initial`, or `None` when empty or `initial` is zero.
    pub fn reduction(&self, initial: f64) -> Option<f64> {
        if initial == 0.0 {
            return None;
        }
        self.last().map(|s| s.residual_norm / initial)
    }
}

impl<'a> IntoIterator for &'a ConvergenceRecord {
    type Item = &'a ResidualSample;
    type IntoIter = std::slice::Iter<'a, ResidualSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut monitor = ConvergenceMonitor::new();
        monitor.observe(1, 1.0).unwrap();
        monitor.observe(2, 0.5).unwrap();
        monitor.observe(5, 0.1).unwrap();
        assert_eq!(monitor.len(), 3);

        let record = monitor.finalize();
        assert_eq!(record.iterations(), vec![1, 2, 5]);
        assert_eq!(record.residual_norms(), vec![1.0, 0.5, 0.1]);
        assert!(record.is_non_increasing());
    }

    #[test]
    fn rejects_repeated_iteration() {
        let mut monitor = ConvergenceMonitor::new();
        monitor.observe(3, 1.0).unwrap();
        let err = monitor.observe(3, 0.9).unwrap_err();
        assert!(matches!(
            err,
            Error::NonMonotonicIteration {
                previous: 3,
                got: 3
            }
        ));
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn rejects_decreasing_iteration() {
        let mut monitor = ConvergenceMonitor::new();
        monitor.observe(2, 1.0).unwrap();
        assert!(monitor.observe(1, 0.5).is_err());
    }

    #[test]
    fn accepts_iteration_zero_first() {
        let mut monitor = ConvergenceMonitor::new();
        monitor.observe(0, 2.0).unwrap();
        monitor.observe(1, 1.0).unwrap();
        assert_eq!(monitor.last().map(|s| s.iteration), Some(1));
    }

    #[test]
    fn rejects_nan_and_negative_residual() {
        let mut monitor = ConvergenceMonitor::new();
        assert!(matches!(
            monitor.observe(1, f64::NAN),
            Err(Error::InvalidResidual { iteration: 1, .. })
        ));
        assert!(monitor.observe(1, -1.0).is_err());
        assert!(monitor.observe(1, f64::INFINITY).is_ok());
    }

    #[test]
    fn empty_record() {
        let record = ConvergenceMonitor::new().finalize();
        assert!(record.is_empty());
        assert!(record.is_non_increasing());
        assert_eq!(record.reduction(1.0), None);
        assert_eq!(record, ConvergenceRecord::empty());
    }

    #[test]
    fn reduction_factor() {
        let mut monitor = ConvergenceMonitor::new();
        monitor.observe(1, 0.5).unwrap();
        monitor.observe(2, 0.01).unwrap();
        let record = monitor.finalize();
        assert!((record.reduction(2.0).unwrap() - 0.005).abs() < 1e-15);
        assert_eq!(record.reduction(0.0), None);
        assert!(!ConvergenceRecord {
            samples: vec![
                ResidualSample { iteration: 1, residual_norm: 1.0 },
                ResidualSample { iteration: 2, residual_norm: 2.0 },
            ]
        }
        .is_non_increasing());
    }
}
