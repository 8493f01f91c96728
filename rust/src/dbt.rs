//! Parsing of dbt run artefacts and custom record/link uploads.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::DatasetConfig;
use crate::dataset::Dataset;
use crate::models::{ExecutionRecord, Link};
use crate::time::parse_timestamp;

const COMPILE_TIMING: &str = "compile";
const EXECUTE_TIMING: &str = "execute";

/// Errors raised while turning uploaded artefacts into a [`Dataset`].
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run_results JSON must contain a 'results' array")]
    MissingResults,
    #[error("graph_summary JSON must contain a 'with_test_edges' mapping")]
    MissingGraphNodes,
    #[error("Unable to parse datetime value: {0:?}")]
    InvalidTimestamp(String),
    #[error("Invalid run results format: {0}")]
    InvalidRecord(String),
    #[error("Invalid links format: {0}")]
    InvalidLink(String),
    #[error("Custom datasets must provide arrays for run results and links")]
    NotArrays,
    #[error("No execution records found in run results artefact")]
    NoRecords,
    #[error("Invalid sample data config: {0}")]
    InvalidSampleConfig(String),
}

/// Record shape of a custom upload; every field must be a string.
#[derive(Deserialize)]
struct RawRecord {
    worker: String,
    started_at: String,
    completed_at: String,
    model: String,
}

#[derive(Deserialize)]
struct RawLink {
    source: String,
    target: String,
}

fn read_json(path: &Path) -> Result<Value, DatasetError> {
    let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Load `run_results.json` and `graph_summary.json` from disk.
pub fn load_dbt_artifacts(
    run_results_path: &Path,
    graph_summary_path: &Path,
    config: &DatasetConfig,
) -> Result<Dataset, DatasetError> {
    let run_results = read_json(run_results_path)?;
    let graph_summary = read_json(graph_summary_path)?;
    parse_dbt_artifacts(&run_results, &graph_summary, config)
}

/// Timestamp `key` of the first timing entry named `name`.
fn timing_value<'a>(timing: &'a [Value], name: &str, key: &str) -> Option<&'a str> {
    timing
        .iter()
        .filter_map(Value::as_object)
        .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|entry| entry.get(key))
        .and_then(Value::as_str)
}

fn parse_run_result(
    item: &Value,
    config: &DatasetConfig,
) -> Result<Option<ExecutionRecord>, DatasetError> {
    let Some(item) = item.as_object() else {
        return Ok(None);
    };
    let Some(thread_id) = item.get("thread_id").and_then(Value::as_str) else {
        return Ok(None);
    };
    if thread_id == config.ignore_thread_id {
        return Ok(None);
    }
    let Some(timing) = item.get("timing").and_then(Value::as_array) else {
        return Ok(None);
    };

    let started = timing_value(timing, COMPILE_TIMING, "started_at");
    let completed = timing_value(timing, EXECUTE_TIMING, "completed_at");
    let unique_id = item.get("unique_id").and_then(Value::as_str);

    let (Some(started), Some(completed), Some(unique_id)) = (started, completed, unique_id) else {
        debug!(thread_id, "skipping run result without compile/execute timing");
        return Ok(None);
    };

    Ok(Some(ExecutionRecord {
        model: unique_id.to_string(),
        worker: thread_id.to_string(),
        started_at: parse_timestamp(started)?,
        completed_at: parse_timestamp(completed)?,
    }))
}

/// Resolve a `succ` entry: by node key first, then by node name.
fn resolve_successor<'a>(nodes: &'a Map<String, Value>, successor: &Value) -> Option<&'a str> {
    let node = match successor {
        Value::String(key) => nodes.get(key).filter(|n| n.is_object()).or_else(|| {
            nodes
                .values()
                .find(|n| n.get("name").and_then(Value::as_str) == Some(key.as_str()))
        }),
        other => nodes.get(&other.to_string()),
    };
    node.and_then(|n| n.get("name")).and_then(Value::as_str)
}

fn parse_graph_links(nodes: &Map<String, Value>) -> Vec<Link> {
    let mut links = Vec::new();
    for node in nodes.values() {
        let Some(name) = node.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(successors) = node.get("succ").and_then(Value::as_array) else {
            continue;
        };
        for successor in successors {
            if let Some(target) = resolve_successor(nodes, successor) {
                links.push(Link::new(name.to_string(), target.to_string()));
            }
        }
    }
    links
}

/// Parse already-loaded dbt artefacts.
///
/// Run results on the ignored thread, or missing compile/execute timings,
/// are skipped rather than rejected.
pub fn parse_dbt_artifacts(
    run_results: &Value,
    graph_summary: &Value,
    config: &DatasetConfig,
) -> Result<Dataset, DatasetError> {
    let results = run_results
        .get("results")
        .and_then(Value::as_array)
        .ok_or(DatasetError::MissingResults)?;
    let nodes = graph_summary
        .get("with_test_edges")
        .and_then(Value::as_object)
        .ok_or(DatasetError::MissingGraphNodes)?;

    let mut records = Vec::with_capacity(results.len());
    for item in results {
        if let Some(record) = parse_run_result(item, config)? {
            records.push(record);
        }
    }
    if records.is_empty() {
        return Err(DatasetError::NoRecords);
    }

    let links = parse_graph_links(nodes);
    debug!(
        records = records.len(),
        links = links.len(),
        "parsed dbt artefacts"
    );
    Ok(Dataset::new(records, links))
}

fn is_dbt_pair(run_results: &Value, graph_summary: &Value) -> bool {
    run_results.get("results").is_some_and(Value::is_array)
        && graph_summary
            .get("with_test_edges")
            .is_some_and(Value::is_object)
}

fn parse_custom_dataset(run_results: Value, links: Value) -> Result<Dataset, DatasetError> {
    let (Value::Array(raw_records), Value::Array(raw_links)) = (run_results, links) else {
        return Err(DatasetError::NotArrays);
    };

    let mut records = Vec::with_capacity(raw_records.len());
    for (i, value) in raw_records.into_iter().enumerate() {
        let raw: RawRecord = serde_json::from_value(value)
            .map_err(|e| DatasetError::InvalidRecord(format!("record {}: {}", i, e)))?;
        records.push(ExecutionRecord {
            started_at: parse_timestamp(&raw.started_at)?,
            completed_at: parse_timestamp(&raw.completed_at)?,
            model: raw.model,
            worker: raw.worker,
        });
    }

    let mut links = Vec::with_capacity(raw_links.len());
    for (i, value) in raw_links.into_iter().enumerate() {
        let raw: RawLink = serde_json::from_value(value)
            .map_err(|e| DatasetError::InvalidLink(format!("link {}: {}", i, e)))?;
        links.push(Link::new(raw.source, raw.target));
    }

    Ok(Dataset::new(records, links))
}

/// Accept either a dbt artefact pair or a pair of record/link arrays.
pub fn parse_uploaded_data(
    run_results: Value,
    graph_summary: Value,
    config: &DatasetConfig,
) -> Result<Dataset, DatasetError> {
    if is_dbt_pair(&run_results, &graph_summary) {
        return parse_dbt_artifacts(&run_results, &graph_summary, config);
    }
    parse_custom_dataset(run_results, graph_summary)
}
