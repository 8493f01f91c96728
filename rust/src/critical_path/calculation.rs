//! Critical path calculation using forward and backward passes.

use std::collections::VecDeque;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ExecutionRecord, Link};
use crate::{log_changes, log_checks, log_debug};

use super::graph::TaskGraph;
use super::progress::{CancelToken, ProgressSink, Stage};
use super::types::{CriticalPathConfig, TaskIdx, TaskTiming};

/// Error types for critical path calculation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalPathError {
    /// The graph referenced a slot it does not contain.
    #[error("Task graph has no entry for task index {index}")]
    StructuralInconsistency { index: TaskIdx },
    /// Only raised when `strict_cycles` is enabled.
    #[error("Circular dependency detected: {excluded} of {total} tasks never became ready")]
    CircularDependency { excluded: usize, total: usize },
}

/// Result of a computation that may be abandoned at a cancellation checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// Full output of one solver run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CriticalPathAnalysis {
    /// Critical path task ids, earliest task first.
    pub path: Vec<String>,
    /// Visited tasks in topological order (excludes tasks stuck behind a cycle).
    pub order: Vec<TaskIdx>,
    /// Timing for every arena slot; unvisited slots keep zeroed timings.
    pub timings: Vec<TaskTiming>,
    /// Latest earliest-finish over visited tasks, in seconds.
    pub project_end: f64,
}

impl CriticalPathAnalysis {
    /// Timing of a task by model id.
    pub fn timing(&self, graph: &TaskGraph, id: &str) -> Option<&TaskTiming> {
        graph
            .index_of(id)
            .and_then(|idx| self.timings.get(idx as usize))
    }

    /// Slack of a task by model id.
    pub fn slack(&self, graph: &TaskGraph, id: &str) -> Option<f64> {
        self.timing(graph, id).map(TaskTiming::slack)
    }

    /// Number of tasks never reached by the forward pass.
    pub fn excluded(&self) -> usize {
        self.timings.len() - self.order.len()
    }
}

#[inline]
fn timing_of(timings: &[TaskTiming], idx: TaskIdx) -> Result<&TaskTiming, CriticalPathError> {
    timings
        .get(idx as usize)
        .ok_or(CriticalPathError::StructuralInconsistency { index: idx })
}

#[inline]
fn timing_of_mut(
    timings: &mut [TaskTiming],
    idx: TaskIdx,
) -> Result<&mut TaskTiming, CriticalPathError> {
    timings
        .get_mut(idx as usize)
        .ok_or(CriticalPathError::StructuralInconsistency { index: idx })
}

/// Kahn's algorithm with earliest start/finish propagation.
///
/// Ready tasks are processed first-ready, first-processed. Tasks whose
/// in-degree never reaches zero are left out of the returned order.
fn forward_pass(
    graph: &TaskGraph,
    timings: &mut [TaskTiming],
    cancel: &CancelToken,
    config: &CriticalPathConfig,
) -> Result<Outcome<Vec<TaskIdx>>, CriticalPathError> {
    let mut remaining: Vec<usize> = graph.nodes().iter().map(|n| n.parents.len()).collect();
    let mut queue: VecDeque<TaskIdx> = graph
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| node.is_source())
        .map(|(idx, _)| idx as TaskIdx)
        .collect();
    let mut order: Vec<TaskIdx> = Vec::with_capacity(graph.len());

    log_debug!(config.verbosity, "Forward pass: {} source tasks", queue.len());

    loop {
        if cancel.checkpoint() {
            return Ok(Outcome::Cancelled);
        }
        let Some(idx) = queue.pop_front() else {
            break;
        };
        order.push(idx);

        let node = graph.node(idx)?;
        let timing = timing_of_mut(timings, idx)?;
        timing.earliest_finish = timing.earliest_start + node.duration;
        let finish = timing.earliest_finish;

        for &child in &node.children {
            let child_timing = timing_of_mut(timings, child)?;
            child_timing.earliest_start = child_timing.earliest_start.max(finish);

            let degree = remaining
                .get_mut(child as usize)
                .ok_or(CriticalPathError::StructuralInconsistency { index: child })?;
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(child);
            }
        }
    }

    Ok(Outcome::Completed(order))
}

/// Latest start/finish over the visited tasks, in reverse topological order.
fn backward_pass(
    graph: &TaskGraph,
    order: &[TaskIdx],
    timings: &mut [TaskTiming],
    project_end: f64,
) -> Result<(), CriticalPathError> {
    for &idx in order.iter().rev() {
        let node = graph.node(idx)?;

        let latest_finish = if node.is_terminal() {
            project_end
        } else {
            let mut min_start = f64::INFINITY;
            for &child in &node.children {
                min_start = min_start.min(timing_of(timings, child)?.latest_start);
            }
            min_start
        };

        let timing = timing_of_mut(timings, idx)?;
        timing.latest_finish = latest_finish;
        timing.latest_start = latest_finish - node.duration;
    }
    Ok(())
}

/// Walk back from the first zero-slack terminal task through zero-slack parents.
fn extract_path(
    graph: &TaskGraph,
    order: &[TaskIdx],
    timings: &[TaskTiming],
    config: &CriticalPathConfig,
    cancel: &CancelToken,
) -> Result<Outcome<Vec<String>>, CriticalPathError> {
    let mut anchor = None;
    for &idx in order {
        if graph.node(idx)?.is_terminal() && timing_of(timings, idx)?.is_critical(config.tolerance)
        {
            anchor = Some(idx);
            break;
        }
    }

    let mut path: Vec<String> = Vec::new();
    let mut current = anchor;

    while let Some(idx) = current {
        if cancel.checkpoint() {
            return Ok(Outcome::Cancelled);
        }
        let node = graph.node(idx)?;
        path.push(node.id.clone());

        let earliest_start = timing_of(timings, idx)?.earliest_start;
        current = None;
        for &parent in &node.parents {
            let parent_timing = timing_of(timings, parent)?;
            if parent_timing.is_critical(config.tolerance)
                && config.same_time(parent_timing.earliest_finish, earliest_start)
            {
                current = Some(parent);
                break;
            }
        }
        log_checks!(
            config.verbosity,
            "  Critical task {} (parent on path: {})",
            node.id,
            current.is_some()
        );
    }

    path.reverse();
    Ok(Outcome::Completed(path))
}

/// Run the forward pass, project horizon, backward pass and path extraction.
///
/// Returns `Outcome::Cancelled` when the token is observed at a checkpoint;
/// no partial result is ever returned.
pub fn analyze(
    graph: &TaskGraph,
    config: &CriticalPathConfig,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Outcome<CriticalPathAnalysis>, CriticalPathError> {
    let mut timings = vec![TaskTiming::default(); graph.len()];

    progress.report(Stage::ForwardPass);
    let order = match forward_pass(graph, &mut timings, cancel, config)? {
        Outcome::Completed(order) => order,
        Outcome::Cancelled => return Ok(Outcome::Cancelled),
    };

    if order.len() < graph.len() {
        let excluded = graph.len() - order.len();
        if config.strict_cycles {
            return Err(CriticalPathError::CircularDependency {
                excluded,
                total: graph.len(),
            });
        }
        warn!(
            excluded,
            total = graph.len(),
            "tasks never became ready (dependency cycle); excluding them"
        );
    }

    progress.report(Stage::ProjectHorizon);
    if order.is_empty() {
        return Ok(Outcome::Completed(CriticalPathAnalysis {
            timings,
            ..Default::default()
        }));
    }
    let mut project_end = f64::NEG_INFINITY;
    for &idx in &order {
        project_end = project_end.max(timing_of(&timings, idx)?.earliest_finish);
    }
    log_changes!(config.verbosity, "Project end: {:.3}s", project_end);

    progress.report(Stage::BackwardPass);
    backward_pass(graph, &order, &mut timings, project_end)?;

    progress.report(Stage::ExtractPath);
    let path = match extract_path(graph, &order, &timings, config, cancel)? {
        Outcome::Completed(path) => path,
        Outcome::Cancelled => return Ok(Outcome::Cancelled),
    };

    progress.report(Stage::Complete);
    log_changes!(
        config.verbosity,
        "Critical path: {} of {} tasks",
        path.len(),
        graph.len()
    );

    Ok(Outcome::Completed(CriticalPathAnalysis {
        path,
        order,
        timings,
        project_end,
    }))
}

/// Compute the critical path of a task graph, earliest task first.
///
/// Cancellation yields an empty path; it is reported through the log and
/// through [`CancelToken::was_observed`], not through the return value.
pub fn solve(
    graph: &TaskGraph,
    config: &CriticalPathConfig,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Vec<String>, CriticalPathError> {
    match analyze(graph, config, progress, cancel)? {
        Outcome::Completed(analysis) => Ok(analysis.path),
        Outcome::Cancelled => {
            info!("critical path calculation cancelled");
            Ok(Vec::new())
        }
    }
}

/// Build the task graph from records and links, then solve it.
///
/// With no records this reports only the graph-building stage and returns
/// an empty path.
pub fn calculate_critical_path(
    records: &[ExecutionRecord],
    links: &[Link],
    config: &CriticalPathConfig,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Vec<String>, CriticalPathError> {
    log_changes!(
        config.verbosity,
        "Calculating critical path for {} records and {} links",
        records.len(),
        links.len()
    );

    progress.report(Stage::BuildGraph);
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let mut graph = TaskGraph::from_records(records);

    progress.report(Stage::LinkDependencies);
    let added = graph.link(links);
    log_debug!(
        config.verbosity,
        "Graph: {} tasks, {} edges ({} links supplied)",
        graph.len(),
        added,
        links.len()
    );

    solve(&graph, config, progress, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critical_path::graph::build;
    use crate::critical_path::progress::NoProgress;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn make_record(model: &str, start: i64, end: i64) -> ExecutionRecord {
        ExecutionRecord {
            model: model.to_string(),
            worker: "Thread-1".to_string(),
            started_at: base() + Duration::seconds(start),
            completed_at: base() + Duration::seconds(end),
        }
    }

    fn make_link(source: &str, target: &str) -> Link {
        Link::new(source.to_string(), target.to_string())
    }

    fn run(records: &[ExecutionRecord], links: &[Link]) -> CriticalPathAnalysis {
        let graph = build(records, links);
        analyze(
            &graph,
            &CriticalPathConfig::default(),
            &mut NoProgress,
            &CancelToken::new(),
        )
        .unwrap()
        .completed()
        .unwrap()
    }

    #[test]
    fn test_single_task_critical_path() {
        let analysis = run(&[make_record("a", 0, 5)], &[]);
        assert_eq!(analysis.path, vec!["a"]);
        assert!((analysis.project_end - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_chain_critical_path() {
        let records = [
            make_record("a", 0, 10),
            make_record("b", 10, 25),
            make_record("c", 25, 30),
        ];
        let links = [make_link("a", "b"), make_link("b", "c")];
        let graph = build(&records, &links);
        let analysis = analyze(
            &graph,
            &CriticalPathConfig::default(),
            &mut NoProgress,
            &CancelToken::new(),
        )
        .unwrap()
        .completed()
        .unwrap();

        assert_eq!(analysis.path, vec!["a", "b", "c"]);
        assert!((analysis.project_end - 30.0).abs() < 1e-9);

        let b = analysis.timing(&graph, "b").unwrap();
        assert!((b.earliest_start - 10.0).abs() < 1e-9);
        assert!((b.earliest_finish - 25.0).abs() < 1e-9);
        assert!((b.latest_start - 10.0).abs() < 1e-9);
        assert!((b.latest_finish - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_diamond_dependency() {
        // a=5, b=20, c=5, d=5: the path through b dominates
        let records = [
            make_record("a", 0, 5),
            make_record("b", 5, 25),
            make_record("c", 5, 10),
            make_record("d", 25, 30),
        ];
        let links = [
            make_link("a", "b"),
            make_link("a", "c"),
            make_link("b", "d"),
            make_link("c", "d"),
        ];
        let graph = build(&records, &links);
        let analysis = analyze(
            &graph,
            &CriticalPathConfig::default(),
            &mut NoProgress,
            &CancelToken::new(),
        )
        .unwrap()
        .completed()
        .unwrap();

        assert_eq!(analysis.path, vec!["a", "b", "d"]);
        assert!((analysis.project_end - 30.0).abs() < 1e-9);
        assert!((analysis.slack(&graph, "c").unwrap() - 15.0).abs() < 1e-9);
        let d = analysis.timing(&graph, "d").unwrap();
        assert!((d.earliest_start - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_paths_pick_longest_branch() {
        // Two independent chains; the anchor is the first zero-slack terminal.
        let records = [
            make_record("a", 0, 3),
            make_record("b", 3, 4),
            make_record("x", 0, 8),
            make_record("y", 8, 10),
        ];
        let links = [make_link("a", "b"), make_link("x", "y")];
        let analysis = run(&records, &links);

        assert_eq!(analysis.path, vec!["x", "y"]);
        assert!((analysis.project_end - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_excluded_by_default() {
        // a -> b, b <-> c: b and c never become ready
        let records = [
            make_record("a", 0, 5),
            make_record("b", 5, 10),
            make_record("c", 10, 15),
        ];
        let links = [make_link("a", "b"), make_link("b", "c"), make_link("c", "b")];
        let analysis = run(&records, &links);

        assert_eq!(analysis.order.len(), 1);
        assert_eq!(analysis.excluded(), 2);
        assert!((analysis.project_end - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_rejected_in_strict_mode() {
        let records = [make_record("a", 0, 5), make_record("b", 5, 10)];
        let links = [make_link("a", "b"), make_link("b", "a")];
        let graph = build(&records, &links);
        let config = CriticalPathConfig {
            strict_cycles: true,
            ..Default::default()
        };

        let result = analyze(&graph, &config, &mut NoProgress, &CancelToken::new());
        assert_eq!(
            result,
            Err(CriticalPathError::CircularDependency {
                excluded: 2,
                total: 2
            })
        );
    }

    #[test]
    fn test_all_cyclic_graph_yields_empty_path() {
        let records = [make_record("a", 0, 5), make_record("b", 5, 10)];
        let links = [make_link("a", "b"), make_link("b", "a")];
        let analysis = run(&records, &links);

        assert!(analysis.path.is_empty());
        assert!(analysis.order.is_empty());
    }

    #[test]
    fn test_fractional_durations_stay_on_path() {
        // 0.1 + 0.2 style sums drift from the project end by a few ulps
        let mut records = vec![
            make_record("a", 0, 0),
            make_record("b", 0, 0),
            make_record("c", 0, 0),
        ];
        records[0].completed_at += Duration::milliseconds(100);
        records[1].completed_at += Duration::milliseconds(200);
        records[2].completed_at += Duration::milliseconds(300);
        let graph = build(&records, &[make_link("a", "b"), make_link("b", "c")]);

        let path = solve(
            &graph,
            &CriticalPathConfig::default(),
            &mut NoProgress,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(path, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_progress_stages_reported_in_order() {
        let records = [make_record("a", 0, 10), make_record("b", 10, 20)];
        let links = [make_link("a", "b")];
        let mut stages: Vec<(String, u8)> = Vec::new();
        let mut sink = |stage: &str, percent: u8| stages.push((stage.to_string(), percent));

        let path = calculate_critical_path(
            &records,
            &links,
            &CriticalPathConfig::default(),
            &mut sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(path, vec!["a", "b"]);
        let percents: Vec<u8> = stages.iter().map(|(_, p)| *p).collect();
        assert_eq!(percents, vec![0, 15, 30, 50, 65, 80, 100]);
        assert_eq!(stages[0].0, "Building graph");
        assert_eq!(stages[6].0, "Finalizing critical path");
    }

    #[test]
    fn test_cancelled_before_start_returns_empty() {
        let records = [make_record("a", 0, 10), make_record("b", 10, 20)];
        let links = [make_link("a", "b")];
        let cancel = CancelToken::new();
        cancel.cancel();

        let path = calculate_critical_path(
            &records,
            &links,
            &CriticalPathConfig::default(),
            &mut NoProgress,
            &cancel,
        )
        .unwrap();

        assert!(path.is_empty());
        assert!(cancel.was_observed());
    }

    #[test]
    fn test_cancel_during_extraction() {
        let records = [make_record("a", 0, 10), make_record("b", 10, 20)];
        let links = [make_link("a", "b")];
        let graph = build(&records, &links);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut sink = move |stage: &str, _percent: u8| {
            if stage == Stage::ExtractPath.name() {
                trigger.cancel();
            }
        };

        let outcome = analyze(&graph, &CriticalPathConfig::default(), &mut sink, &cancel).unwrap();
        assert!(outcome.is_cancelled());
        assert!(cancel.was_observed());
    }

    #[test]
    fn test_empty_result_without_cancellation_is_not_observed() {
        let cancel = CancelToken::new();
        let path = calculate_critical_path(
            &[],
            &[],
            &CriticalPathConfig::default(),
            &mut NoProgress,
            &cancel,
        )
        .unwrap();
        assert!(path.is_empty());
        assert!(!cancel.was_observed());
    }
}
