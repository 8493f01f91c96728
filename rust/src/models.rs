//! Core data types for execution analytics.

use chrono::NaiveDateTime;
use pyo3::prelude::*;

use crate::time::{duration_seconds, format_duration};

/// A single task execution: `model` ran on `worker` from `started_at` to `completed_at`.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionRecord {
    #[pyo3(get, set)]
    pub model: String,
    #[pyo3(get, set)]
    pub worker: String,
    #[pyo3(get, set)]
    pub started_at: NaiveDateTime,
    #[pyo3(get, set)]
    pub completed_at: NaiveDateTime,
}

impl ExecutionRecord {
    /// Execution duration in seconds. Negative when the timestamps are inverted.
    pub fn duration_seconds(&self) -> f64 {
        duration_seconds(self.started_at, self.completed_at)
    }
}

#[pymethods]
impl ExecutionRecord {
    #[new]
    fn new(
        model: String,
        worker: String,
        started_at: NaiveDateTime,
        completed_at: NaiveDateTime,
    ) -> Self {
        Self {
            model,
            worker,
            started_at,
            completed_at,
        }
    }

    #[getter(duration)]
    fn py_duration(&self) -> f64 {
        self.duration_seconds()
    }

    fn __repr__(&self) -> String {
        format!(
            "ExecutionRecord(model={:?}, worker={:?}, started_at={}, completed_at={})",
            self.model, self.worker, self.started_at, self.completed_at
        )
    }
}

/// A dependency edge: `source` must complete before `target`.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    #[pyo3(get, set)]
    pub source: String,
    #[pyo3(get, set)]
    pub target: String,
}

#[pymethods]
impl Link {
    #[new]
    pub fn new(source: String, target: String) -> Self {
        Self { source, target }
    }

    fn __repr__(&self) -> String {
        format!("Link(source={:?}, target={:?})", self.source, self.target)
    }
}

/// Number of distinct workers busy during one activity period.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerActivitySample {
    /// Start of the period.
    #[pyo3(get)]
    pub time: NaiveDateTime,
    #[pyo3(get)]
    pub active_workers: usize,
}

#[pymethods]
impl WorkerActivitySample {
    fn __repr__(&self) -> String {
        format!(
            "WorkerActivitySample(time={}, active_workers={})",
            self.time, self.active_workers
        )
    }
}

/// Everything known about one model: its execution and its direct neighbours.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ModelDetails {
    #[pyo3(get)]
    pub model: String,
    #[pyo3(get)]
    pub worker: String,
    #[pyo3(get)]
    pub started_at: NaiveDateTime,
    #[pyo3(get)]
    pub completed_at: NaiveDateTime,
    #[pyo3(get)]
    pub duration_seconds: f64,
    /// Sources of links targeting this model, in link order.
    #[pyo3(get)]
    pub parents: Vec<String>,
    /// Targets of links leaving this model, in link order.
    #[pyo3(get)]
    pub children: Vec<String>,
}

#[pymethods]
impl ModelDetails {
    fn __repr__(&self) -> String {
        format!(
            "ModelDetails(model={:?}, worker={:?}, duration={}, parents={}, children={})",
            self.model,
            self.worker,
            format_duration(self.duration_seconds),
            self.parents.len(),
            self.children.len()
        )
    }
}

/// Length and wall time of a computed critical path.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct CriticalPathSummary {
    #[pyo3(get)]
    pub length: usize,
    #[pyo3(get)]
    pub total_duration_seconds: f64,
}

#[pymethods]
impl CriticalPathSummary {
    /// Total duration rendered as `"Hh Mm Ss"`.
    #[getter]
    pub fn formatted_duration(&self) -> String {
        format_duration(self.total_duration_seconds)
    }

    fn __repr__(&self) -> String {
        format!(
            "CriticalPathSummary(length={}, total_duration={})",
            self.length,
            self.formatted_duration()
        )
    }
}
