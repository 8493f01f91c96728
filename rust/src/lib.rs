//! Rust implementation of the Pavel execution analytics engine.
//!
//! This module provides the critical path engine and dataset analytics
//! behind the dashboard: dbt artefact loading, worker activity aggregation,
//! and the zero-slack chain of tasks that bounds total pipeline duration.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::PathBuf;
use tracing::warn;

pub mod config;
pub mod critical_path;
pub mod dataset;
pub mod dbt;
pub mod logging;
pub mod models;
pub mod sample;
pub mod time;

pub use config::{DatasetConfig, SampleDataConfig};
pub use critical_path::{
    analyze, build, calculate_critical_path, solve, CancelToken, CriticalPathAnalysis,
    CriticalPathConfig, CriticalPathError, NoProgress, Outcome, ProgressSink, Stage, TaskGraph,
    TaskIdx, TaskNode, TaskTiming, DEFAULT_TOLERANCE,
};
pub use dataset::Dataset;
pub use dbt::{load_dbt_artifacts, parse_dbt_artifacts, parse_uploaded_data, DatasetError};
pub use models::{CriticalPathSummary, ExecutionRecord, Link, ModelDetails, WorkerActivitySample};
pub use sample::generate_sample_data;

impl From<CriticalPathError> for PyErr {
    fn from(err: CriticalPathError) -> Self {
        match err {
            CriticalPathError::CircularDependency { .. } => PyValueError::new_err(err.to_string()),
            CriticalPathError::StructuralInconsistency { .. } => {
                PyRuntimeError::new_err(err.to_string())
            }
        }
    }
}

impl From<DatasetError> for PyErr {
    fn from(err: DatasetError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

/// Forwards solver progress to an optional Python callable `(stage, percent)`.
///
/// The first exception raised by the callable is kept and the callable is
/// not invoked again; the caller re-raises it once the solver returns.
struct PyProgress {
    callback: Option<PyObject>,
    error: Option<PyErr>,
}

impl PyProgress {
    fn new(callback: Option<PyObject>) -> Self {
        Self {
            callback,
            error: None,
        }
    }
}

impl ProgressSink for PyProgress {
    fn on_progress(&mut self, stage: &str, percent: u8) {
        if self.error.is_some() {
            return;
        }
        let Some(callback) = &self.callback else {
            return;
        };
        if let Err(err) = Python::with_gil(|py| callback.call1(py, (stage, percent))) {
            warn!(stage, error = %err, "progress callback raised");
            self.error = Some(err);
        }
    }
}

/// Calculate the critical path of a set of execution records.
///
/// # Arguments
/// * `records` - Executions; the model id of each is its task id
/// * `links` - Dependency edges; links to unknown models are ignored
/// * `on_progress` - Optional callable receiving `(stage_name, percent)`
/// * `cancel_token` - Optional CancelToken; cancelling yields an empty path
/// * `config` - Solver configuration (tolerance, verbosity, strict cycles)
///
/// # Returns
/// * Model ids on the critical path, earliest first
///
/// # Raises
/// * Whatever `on_progress` raised first; the calculation still runs to completion
/// * ValueError if `strict_cycles` is set and the graph has a cycle
/// * RuntimeError if the task graph is internally inconsistent
#[pyfunction]
#[pyo3(
    name = "calculate_critical_path",
    signature = (records, links, on_progress=None, cancel_token=None, config=None)
)]
fn py_calculate_critical_path(
    py: Python<'_>,
    records: Vec<ExecutionRecord>,
    links: Vec<Link>,
    on_progress: Option<PyObject>,
    cancel_token: Option<CancelToken>,
    config: Option<CriticalPathConfig>,
) -> PyResult<Vec<String>> {
    let config = config.unwrap_or_default();
    let cancel = cancel_token.unwrap_or_default();
    let mut progress = PyProgress::new(on_progress);

    // Release the GIL so another Python thread can cancel the token.
    let result = py.allow_threads(|| {
        calculate_critical_path(&records, &links, &config, &mut progress, &cancel)
    });
    if let Some(err) = progress.error.take() {
        return Err(err);
    }
    Ok(result?)
}

/// Load a Dataset from dbt's `run_results.json` and `graph_summary.json`.
///
/// # Raises
/// * ValueError if a file cannot be read or parsed, or holds no records
#[pyfunction]
#[pyo3(name = "load_dbt_artifacts", signature = (run_results, graph_summary, config=None))]
fn py_load_dbt_artifacts(
    run_results: PathBuf,
    graph_summary: PathBuf,
    config: Option<DatasetConfig>,
) -> PyResult<Dataset> {
    let config = config.unwrap_or_default();
    Ok(load_dbt_artifacts(&run_results, &graph_summary, &config)?)
}

/// Parse uploaded JSON text: a dbt artefact pair, or record and link arrays.
///
/// # Raises
/// * ValueError if the JSON is malformed or has the wrong shape
#[pyfunction]
#[pyo3(
    name = "parse_uploaded_data",
    signature = (run_results_json, graph_summary_json, config=None)
)]
fn py_parse_uploaded_data(
    run_results_json: &str,
    graph_summary_json: &str,
    config: Option<DatasetConfig>,
) -> PyResult<Dataset> {
    let config = config.unwrap_or_default();
    let run_results = serde_json::from_str(run_results_json).map_err(DatasetError::from)?;
    let graph_summary = serde_json::from_str(graph_summary_json).map_err(DatasetError::from)?;
    Ok(parse_uploaded_data(run_results, graph_summary, &config)?)
}

/// Generate a random Dataset starting now (UTC).
///
/// # Raises
/// * ValueError if the config has no workers, no models or a non-positive chaos level
#[pyfunction]
#[pyo3(name = "generate_sample_data", signature = (config=None))]
fn py_generate_sample_data(config: Option<SampleDataConfig>) -> PyResult<Dataset> {
    let config = config.unwrap_or_default();
    Ok(generate_sample_data(&config, chrono::Utc::now().naive_utc())?)
}

/// Render seconds as `"Hh Mm Ss"`.
#[pyfunction]
#[pyo3(name = "format_duration")]
fn py_format_duration(seconds: f64) -> String {
    time::format_duration(seconds)
}

/// Install the stderr log subscriber. Returns False if one was already installed.
#[pyfunction]
#[pyo3(name = "init_logging", signature = (level=None))]
fn py_init_logging(level: Option<&str>) -> bool {
    logging::init_logging(level)
}

/// The pavel.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<ExecutionRecord>()?;
    m.add_class::<Link>()?;
    m.add_class::<Dataset>()?;
    m.add_class::<WorkerActivitySample>()?;
    m.add_class::<ModelDetails>()?;
    m.add_class::<CriticalPathSummary>()?;
    m.add_class::<CancelToken>()?;

    // Config types
    m.add_class::<CriticalPathConfig>()?;
    m.add_class::<DatasetConfig>()?;
    m.add_class::<SampleDataConfig>()?;

    // Functions
    m.add_function(wrap_pyfunction!(py_calculate_critical_path, m)?)?;
    m.add_function(wrap_pyfunction!(py_load_dbt_artifacts, m)?)?;
    m.add_function(wrap_pyfunction!(py_parse_uploaded_data, m)?)?;
    m.add_function(wrap_pyfunction!(py_generate_sample_data, m)?)?;
    m.add_function(wrap_pyfunction!(py_format_duration, m)?)?;
    m.add_function(wrap_pyfunction!(py_init_logging, m)?)?;

    Ok(())
}
