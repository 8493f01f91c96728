//! Configuration types for dataset ingestion and analytics.

use pyo3::prelude::*;

/// Configuration for loading execution artefacts and aggregating activity.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetConfig {
    /// dbt thread id used for bookkeeping rather than real execution; its results are skipped
    #[pyo3(get, set)]
    pub ignore_thread_id: String,
    /// Width of one worker activity bucket, in seconds
    #[pyo3(get, set)]
    pub activity_period_seconds: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            ignore_thread_id: "main".to_string(),
            activity_period_seconds: 5.0,
        }
    }
}

#[pymethods]
impl DatasetConfig {
    #[new]
    #[pyo3(signature = (ignore_thread_id=None, activity_period_seconds=None))]
    fn new(ignore_thread_id: Option<String>, activity_period_seconds: Option<f64>) -> Self {
        let defaults = Self::default();
        Self {
            ignore_thread_id: ignore_thread_id.unwrap_or(defaults.ignore_thread_id),
            activity_period_seconds: activity_period_seconds
                .unwrap_or(defaults.activity_period_seconds),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "DatasetConfig(ignore_thread_id={:?}, activity_period_seconds={})",
            self.ignore_thread_id, self.activity_period_seconds
        )
    }
}

/// Shape of a generated sample dataset.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct SampleDataConfig {
    #[pyo3(get, set)]
    pub num_workers: usize,
    /// Total models; about 30% of them are generated as sources
    #[pyo3(get, set)]
    pub num_models: usize,
    /// Scales mean duration, maximum duration and fan-in (1 = calm, 10 = wild)
    #[pyo3(get, set)]
    pub chaos_level: f64,
    /// Fixed RNG seed for reproducible datasets
    #[pyo3(get, set)]
    pub seed: Option<u64>,
}

impl Default for SampleDataConfig {
    fn default() -> Self {
        Self {
            num_workers: 10,
            num_models: 50,
            chaos_level: 3.0,
            seed: None,
        }
    }
}

#[pymethods]
impl SampleDataConfig {
    #[new]
    #[pyo3(signature = (num_workers=None, num_models=None, chaos_level=None, seed=None))]
    fn new(
        num_workers: Option<usize>,
        num_models: Option<usize>,
        chaos_level: Option<f64>,
        seed: Option<u64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            num_workers: num_workers.unwrap_or(defaults.num_workers),
            num_models: num_models.unwrap_or(defaults.num_models),
            chaos_level: chaos_level.unwrap_or(defaults.chaos_level),
            seed,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SampleDataConfig(num_workers={}, num_models={}, chaos_level={}, seed={:?})",
            self.num_workers, self.num_models, self.chaos_level, self.seed
        )
    }
}
