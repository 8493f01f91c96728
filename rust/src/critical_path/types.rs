//! Types for critical path calculation.

use pyo3::prelude::*;

/// Arena slot of a task inside a [`TaskGraph`](super::TaskGraph).
pub type TaskIdx = u32;

/// Default tolerance for time comparisons, in seconds (one millisecond).
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Configuration for the critical path solver.
#[pyclass]
#[derive(Clone, Debug)]
pub struct CriticalPathConfig {
    /// Two times closer than this (in seconds) are considered equal.
    #[pyo3(get, set)]
    pub tolerance: f64,

    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,

    /// Fail with a circular dependency error instead of silently
    /// excluding tasks that never become ready.
    #[pyo3(get, set)]
    pub strict_cycles: bool,
}

#[pymethods]
impl CriticalPathConfig {
    #[new]
    #[pyo3(signature = (tolerance=DEFAULT_TOLERANCE, verbosity=0, strict_cycles=false))]
    fn new(tolerance: f64, verbosity: u8, strict_cycles: bool) -> Self {
        Self {
            tolerance,
            verbosity,
            strict_cycles,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "CriticalPathConfig(tolerance={}, verbosity={}, strict_cycles={})",
            self.tolerance, self.verbosity, self.strict_cycles
        )
    }
}

impl Default for CriticalPathConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            verbosity: 0,
            strict_cycles: false,
        }
    }
}

impl CriticalPathConfig {
    /// Tolerance-based equality for two times in seconds.
    #[inline]
    pub fn same_time(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.tolerance
    }
}

/// Per-task timing information computed by the forward and backward passes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskTiming {
    /// Earliest possible start time (from forward pass).
    pub earliest_start: f64,
    /// Earliest possible finish time (from forward pass).
    pub earliest_finish: f64,
    /// Latest allowable start time (from backward pass).
    pub latest_start: f64,
    /// Latest allowable finish time (from backward pass).
    pub latest_finish: f64,
}

impl TaskTiming {
    /// Slack = |latest_finish - earliest_finish|.
    pub fn slack(&self) -> f64 {
        (self.latest_finish - self.earliest_finish).abs()
    }

    pub fn is_critical(&self, tolerance: f64) -> bool {
        self.slack() < tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CriticalPathConfig::default();
        assert!((config.tolerance - 0.001).abs() < 1e-12);
        assert_eq!(config.verbosity, 0);
        assert!(!config.strict_cycles);
    }

    #[test]
    fn test_same_time_uses_tolerance() {
        let config = CriticalPathConfig::default();
        assert!(config.same_time(10.0, 10.0005));
        assert!(!config.same_time(10.0, 10.002));
    }

    #[test]
    fn test_slack_is_absolute_finish_gap() {
        let on_path = TaskTiming {
            earliest_start: 12.0,
            earliest_finish: 20.5,
            latest_start: 12.0,
            latest_finish: 20.5,
        };
        assert!(on_path.is_critical(DEFAULT_TOLERANCE));

        let floating = TaskTiming {
            earliest_start: 3.0,
            earliest_finish: 4.0,
            latest_start: 9.0,
            latest_finish: 10.0,
        };
        assert!(!floating.is_critical(DEFAULT_TOLERANCE));
        assert!((floating.slack() - 6.0).abs() < 1e-12);

        let inverted = TaskTiming {
            latest_finish: 3.5,
            ..floating
        };
        assert!((inverted.slack() - 0.5).abs() < 1e-12);
    }
}
