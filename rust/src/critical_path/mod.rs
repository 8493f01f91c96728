//! Critical path engine.
//!
//! Builds a task graph from execution records and dependency links, runs a
//! forward (earliest times) and backward (latest times) pass over its
//! topological order, and extracts the chain of zero-slack tasks that
//! bounds the total pipeline duration.

mod calculation;
mod graph;
mod progress;
mod types;

pub use calculation::{
    analyze, calculate_critical_path, solve, CriticalPathAnalysis, CriticalPathError, Outcome,
};
pub use graph::{build, TaskGraph, TaskNode};
pub use progress::{CancelToken, NoProgress, ProgressSink, Stage};
pub use types::{CriticalPathConfig, TaskIdx, TaskTiming, DEFAULT_TOLERANCE};
