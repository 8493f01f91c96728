//! Stage progress reporting and cooperative cancellation for the solver.

use pyo3::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ordered stages of one critical path calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    BuildGraph,
    LinkDependencies,
    ForwardPass,
    ProjectHorizon,
    BackwardPass,
    ExtractPath,
    Complete,
}

impl Stage {
    /// Human-readable stage name passed to progress sinks.
    pub fn name(self) -> &'static str {
        match self {
            Stage::BuildGraph => "Building graph",
            Stage::LinkDependencies => "Processing dependencies",
            Stage::ForwardPass => "Calculating times",
            Stage::ProjectHorizon => "Computing project end",
            Stage::BackwardPass => "Calculating latest times",
            Stage::ExtractPath | Stage::Complete => "Finalizing critical path",
        }
    }

    /// Percent complete when the stage begins.
    pub fn percent(self) -> u8 {
        match self {
            Stage::BuildGraph => 0,
            Stage::LinkDependencies => 15,
            Stage::ForwardPass => 30,
            Stage::ProjectHorizon => 50,
            Stage::BackwardPass => 65,
            Stage::ExtractPath => 80,
            Stage::Complete => 100,
        }
    }
}

/// Receiver of `(stage name, percent complete)` notifications.
///
/// Notifications are delivered synchronously on the solver's thread.
pub trait ProgressSink {
    fn on_progress(&mut self, stage: &str, percent: u8);

    fn report(&mut self, stage: Stage) {
        self.on_progress(stage.name(), stage.percent());
    }
}

impl<F> ProgressSink for F
where
    F: FnMut(&str, u8),
{
    fn on_progress(&mut self, stage: &str, percent: u8) {
        self(stage, percent)
    }
}

/// Progress sink that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _stage: &str, _percent: u8) {}
}

/// Cooperative cancellation handle.
///
/// Clones share state, so one clone can be handed to a timer or another
/// thread while the solver polls the other. Cancellation is one-way.
#[pyclass]
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
    observed: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solver checkpoint: true when cancellation was requested, in which
    /// case the token also records that a solver acted on it.
    pub(crate) fn checkpoint(&self) -> bool {
        if self.requested.load(Ordering::Acquire) {
            self.observed.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }
}

#[pymethods]
impl CancelToken {
    #[new]
    fn py_new() -> Self {
        Self::new()
    }

    /// Request cancellation. Later calls have no further effect.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Whether a solver stopped early because of this token.
    ///
    /// Distinguishes "cancelled" from "no critical path exists" when both
    /// produce an empty path.
    pub fn was_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }

    fn __repr__(&self) -> String {
        format!(
            "CancelToken(cancelled={}, observed={})",
            self.is_cancelled(),
            self.was_observed()
        )
    }
}
