//! In-memory execution dataset and the analytics derived from it.

use chrono::{NaiveDateTime, TimeDelta};
use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::critical_path::{
    calculate_critical_path, CancelToken, CriticalPathConfig, CriticalPathError, NoProgress,
};
use crate::models::{
    CriticalPathSummary, ExecutionRecord, Link, ModelDetails, WorkerActivitySample,
};
use crate::time::{duration_seconds, worker_sort_key};

/// Execution records plus the dependency links between their models.
#[pyclass]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    #[pyo3(get)]
    pub records: Vec<ExecutionRecord>,
    #[pyo3(get)]
    pub links: Vec<Link>,
}

impl Dataset {
    pub fn new(records: Vec<ExecutionRecord>, links: Vec<Link>) -> Self {
        Self { records, links }
    }

    /// First start and last completion across all records.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = self.records.iter().map(|r| r.started_at).min()?;
        let end = self.records.iter().map(|r| r.completed_at).max()?;
        Some((start, end))
    }

    /// Wall time from the first start to the last completion, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.time_range()
            .map(|(start, end)| duration_seconds(start, end))
            .unwrap_or(0.0)
    }

    pub fn total_models(&self) -> usize {
        self.records.len()
    }

    pub fn total_workers(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.worker.as_str())
            .collect::<FxHashSet<_>>()
            .len()
    }

    /// Distinct workers, `Thread-2` before `Thread-10`.
    pub fn workers(&self) -> Vec<String> {
        let mut workers: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.worker.as_str())
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        workers.sort_by(|a, b| worker_sort_key(a).cmp(&worker_sort_key(b)));
        workers.into_iter().map(str::to_string).collect()
    }

    /// Distinct busy workers per fixed-width period.
    ///
    /// A record counts towards a period when it overlaps it:
    /// `start < period_end && end > period_start`. A period longer than the
    /// whole run yields a single sample covering everything.
    pub fn worker_activity(&self, period_seconds: f64) -> Vec<WorkerActivitySample> {
        let Some((start, end)) = self.time_range() else {
            return Vec::new();
        };
        // `as` saturates, so huge periods become i64::MAX and NaN becomes 0
        let period_ms = (period_seconds * 1000.0).round() as i64;
        if period_ms <= 0 {
            return Vec::new();
        }

        let span_ms = (end - start).num_milliseconds();
        let periods = if span_ms > 0 {
            span_ms / period_ms + i64::from(span_ms % period_ms != 0)
        } else {
            0
        };
        let period = TimeDelta::try_milliseconds(period_ms);

        (0..periods)
            .filter_map(|i| {
                let period_start =
                    start.checked_add_signed(TimeDelta::try_milliseconds(i * period_ms)?)?;
                // None when the period runs past the representable range
                let period_end = period.and_then(|p| period_start.checked_add_signed(p));
                let active_workers = self
                    .records
                    .iter()
                    .filter(|r| {
                        period_end.map_or(true, |e| r.started_at < e)
                            && r.completed_at > period_start
                    })
                    .map(|r| r.worker.as_str())
                    .collect::<FxHashSet<_>>()
                    .len();
                Some(WorkerActivitySample {
                    time: period_start,
                    active_workers,
                })
            })
            .collect()
    }

    /// Execution and neighbours of one model; the last record for the model wins.
    pub fn model_details(&self, model: &str) -> Option<ModelDetails> {
        let record = self.records.iter().rev().find(|r| r.model == model)?;
        let parents = self
            .links
            .iter()
            .filter(|l| l.target == model)
            .map(|l| l.source.clone())
            .collect();
        let children = self
            .links
            .iter()
            .filter(|l| l.source == model)
            .map(|l| l.target.clone())
            .collect();

        Some(ModelDetails {
            model: record.model.clone(),
            worker: record.worker.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            duration_seconds: record.duration_seconds(),
            parents,
            children,
        })
    }

    /// Critical path with no progress reporting or cancellation.
    pub fn critical_path(
        &self,
        config: &CriticalPathConfig,
    ) -> Result<Vec<String>, CriticalPathError> {
        calculate_critical_path(
            &self.records,
            &self.links,
            config,
            &mut NoProgress,
            &CancelToken::new(),
        )
    }

    /// Path length and the summed durations of its models.
    pub fn critical_path_summary(&self, path: &[String]) -> CriticalPathSummary {
        let durations: FxHashMap<&str, f64> = self
            .records
            .iter()
            .map(|r| (r.model.as_str(), r.duration_seconds()))
            .collect();
        let total_duration_seconds = path
            .iter()
            .filter_map(|model| durations.get(model.as_str()))
            .sum();

        CriticalPathSummary {
            length: path.len(),
            total_duration_seconds,
        }
    }
}

#[pymethods]
impl Dataset {
    #[new]
    #[pyo3(signature = (records, links=None))]
    fn py_new(records: Vec<ExecutionRecord>, links: Option<Vec<Link>>) -> Self {
        Self::new(records, links.unwrap_or_default())
    }

    #[getter(total_duration)]
    fn py_total_duration(&self) -> f64 {
        self.total_duration()
    }

    #[getter(total_models)]
    fn py_total_models(&self) -> usize {
        self.total_models()
    }

    #[getter(total_workers)]
    fn py_total_workers(&self) -> usize {
        self.total_workers()
    }

    #[pyo3(name = "workers")]
    fn py_workers(&self) -> Vec<String> {
        self.workers()
    }

    #[pyo3(name = "worker_activity", signature = (period_seconds=5.0))]
    fn py_worker_activity(&self, period_seconds: f64) -> Vec<WorkerActivitySample> {
        self.worker_activity(period_seconds)
    }

    #[pyo3(name = "model_details")]
    fn py_model_details(&self, model: &str) -> Option<ModelDetails> {
        self.model_details(model)
    }

    #[pyo3(name = "critical_path", signature = (config=None))]
    fn py_critical_path(&self, config: Option<CriticalPathConfig>) -> PyResult<Vec<String>> {
        Ok(self.critical_path(&config.unwrap_or_default())?)
    }

    #[pyo3(name = "critical_path_summary")]
    fn py_critical_path_summary(&self, path: Vec<String>) -> CriticalPathSummary {
        self.critical_path_summary(&path)
    }

    fn __repr__(&self) -> String {
        format!(
            "Dataset(models={}, links={}, workers={})",
            self.total_models(),
            self.links.len(),
            self.total_workers()
        )
    }
}
