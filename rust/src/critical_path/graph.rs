//! Task graph construction from execution records and dependency links.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::models::{ExecutionRecord, Link};

use super::calculation::CriticalPathError;
use super::types::TaskIdx;

/// One task in the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskNode {
    pub id: String,
    /// Execution time in seconds; negative for inverted records.
    pub duration: f64,
    /// Upstream tasks, in link order, without duplicates.
    pub parents: Vec<TaskIdx>,
    /// Downstream tasks, in link order, without duplicates.
    pub children: Vec<TaskIdx>,
}

impl TaskNode {
    fn new(id: String, duration: f64) -> Self {
        Self {
            id,
            duration,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_source(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena of task nodes addressed by [`TaskIdx`], with lookup by model id.
///
/// Slots are assigned in first-seen record order, so building the same
/// input twice yields identical graphs.
#[derive(Clone, Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: FxHashMap<String, TaskIdx>,
    edges: FxHashSet<(TaskIdx, TaskIdx)>,
}

impl TaskGraph {
    /// Create one node per distinct model.
    ///
    /// A later record for an already-seen model overwrites its duration.
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let mut nodes: Vec<TaskNode> = Vec::with_capacity(records.len());
        let mut index: FxHashMap<String, TaskIdx> =
            FxHashMap::with_capacity_and_hasher(records.len(), Default::default());

        for record in records {
            let duration = record.duration_seconds();
            if duration < 0.0 {
                warn!(
                    model = %record.model,
                    duration,
                    "record completes before it starts; keeping negative duration"
                );
            }

            match index.get(record.model.as_str()) {
                Some(&idx) => {
                    debug!(model = %record.model, "duplicate record overwrites earlier one");
                    nodes[idx as usize].duration = duration;
                }
                None => {
                    let idx = nodes.len() as TaskIdx;
                    index.insert(record.model.clone(), idx);
                    nodes.push(TaskNode::new(record.model.clone(), duration));
                }
            }
        }

        Self {
            nodes,
            index,
            edges: FxHashSet::default(),
        }
    }

    /// Add dependency edges between known tasks.
    ///
    /// Links with an unknown endpoint are dropped; repeated links are no-ops.
    /// Returns the number of edges actually added.
    pub fn link(&mut self, links: &[Link]) -> usize {
        let mut added = 0;
        let mut dropped = 0;

        for link in links {
            let (Some(&source), Some(&target)) = (
                self.index.get(link.source.as_str()),
                self.index.get(link.target.as_str()),
            ) else {
                dropped += 1;
                continue;
            };

            if !self.edges.insert((source, target)) {
                continue;
            }
            self.nodes[source as usize].children.push(target);
            self.nodes[target as usize].parents.push(source);
            added += 1;
        }

        if dropped > 0 {
            debug!(dropped, "dropped links referencing unknown tasks");
        }
        added
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Arena slot of a model id.
    #[inline]
    pub fn index_of(&self, id: &str) -> Option<TaskIdx> {
        self.index.get(id).copied()
    }

    /// Node at an arena slot.
    #[inline]
    pub fn node(&self, idx: TaskIdx) -> Result<&TaskNode, CriticalPathError> {
        self.nodes
            .get(idx as usize)
            .ok_or(CriticalPathError::StructuralInconsistency { index: idx })
    }

    /// Node by model id.
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.index_of(id).and_then(|idx| self.nodes.get(idx as usize))
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }
}

/// Build a task graph from records and links.
pub fn build(records: &[ExecutionRecord], links: &[Link]) -> TaskGraph {
    let mut graph = TaskGraph::from_records(records);
    graph.link(links);
    graph
}
