// src/errors.rs

//! Crate-wide error types.
//!
//! - [`GraphError`]: structural problems found while building a job graph.
//! - [`ContextError`]: misuse of a task id (duplicate, unknown, abandoned).
//! - [`TaskFailure`]: the failure delivered to whoever awaits a task.
//! - [`InvariantViolation`]: programming-level bugs detected at runtime.
//! - [`JobGraphError`]: the umbrella type returned by the public API.

use std::time::Duration;

use thiserror::Error;

use crate::engine::{NodeName, TaskId};

/// Structural problem in a job graph. Fatal at build time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph must contain at least one job")]
    Empty,

    #[error("duplicate job name '{0}'")]
    DuplicateJob(NodeName),

    #[error("edge {from} -> {to} references unknown job '{missing}'")]
    UnknownNode {
        from: NodeName,
        to: NodeName,
        missing: NodeName,
    },

    #[error("graph has no head jobs (every job has a parent)")]
    NoHeads,

    #[error("jobs unreachable from any head: {0:?}")]
    Unreachable(Vec<NodeName>),

    #[error("cycle detected in job graph involving job '{0}'")]
    Cycle(NodeName),
}

/// Attempted use of a task id that the dispatcher cannot honour.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("task {0} is already in flight")]
    DuplicateTask(TaskId),

    #[error("unknown or already completed task {0}")]
    UnknownTask(TaskId),

    #[error("task {0} was abandoned before producing a result")]
    Abandoned(TaskId),
}

/// A job's `run` returned an error (or panicked, or timed out).
#[derive(Error, Debug)]
#[error("job '{node}' failed for task {task_id}: {source:#}")]
pub struct NodeFailure {
    pub node: NodeName,
    pub task_id: TaskId,
    #[source]
    pub source: anyhow::Error,
}

/// Final failure of a task, as seen by the caller awaiting it.
#[derive(Error, Debug)]
pub enum TaskFailure {
    #[error(transparent)]
    Node(#[from] NodeFailure),

    #[error("task {task_id} timed out after {after:?}")]
    Timeout { task_id: TaskId, after: Duration },

    #[error("task aborted: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl TaskFailure {
    /// Name of the job that caused the failure, if a job did.
    pub fn node(&self) -> Option<&str> {
        match self {
            TaskFailure::Node(f) => Some(f.node.as_str()),
            TaskFailure::Timeout { .. } => None,
            TaskFailure::Invariant(v) => Some(v.node()),
        }
    }
}

/// Detected breach of the per-task execution invariants.
///
/// These never overwrite state; the coordinator logs them at `error` and
/// fails the task with [`TaskFailure::Invariant`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("job '{node}' dispatched twice for task {task_id}")]
    DoubleInvocation { task_id: TaskId, node: NodeName },

    #[error("job '{node}' received more parent completions than it has parents (task {task_id})")]
    PendingUnderflow { task_id: TaskId, node: NodeName },

    #[error("job '{node}' is not part of the context for task {task_id}")]
    UnknownNode { task_id: TaskId, node: NodeName },
}

impl InvariantViolation {
    pub fn node(&self) -> &str {
        match self {
            InvariantViolation::DoubleInvocation { node, .. }
            | InvariantViolation::PendingUnderflow { node, .. }
            | InvariantViolation::UnknownNode { node, .. } => node,
        }
    }
}

#[derive(Error, Debug)]
pub enum JobGraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    TaskFailed(#[from] TaskFailure),

    #[error("Unknown graph: {0}")]
    UnknownGraph(String),

    #[error("Graph name required: {0} graphs are registered")]
    GraphNameRequired(usize),

    #[error("Runtime is no longer accepting events")]
    RuntimeClosed,

    #[error("Result sink is closed")]
    SinkClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobGraphError>;
