// src/engine/mod.rs

//! Execution engine.
//!
//! This module ties together:
//! - per-task execution contexts ([`context`])
//! - the job invocation wrapper ([`node`])
//! - the fan-in / fan-out coordinator ([`coordinator`])
//! - task admission and result delivery ([`dispatcher`])
//! - a long-running intake loop with result sinks ([`runtime`], [`sink`])
//!
//! A task's result is never passed back up a chain of awaited calls. Each
//! job completion writes into its own task's context and schedules ready
//! children as independent tokio tasks; the caller waits on the context's
//! completion slot only.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::TaskFailure;

/// Canonical job name type used throughout the engine.
pub type NodeName = String;

/// Unique identifier of an external task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for TaskId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// An external unit of work: an id plus the payload for the head jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<V> {
    pub id: TaskId,
    pub payload: V,
}

impl<V> Task<V> {
    pub fn new(id: impl Into<TaskId>, payload: V) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Result of a single job invocation.
#[derive(Debug)]
pub enum Outcome<V> {
    Success(V),
    Failure(anyhow::Error),
}

impl<V> Outcome<V> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// What a successfully completed task resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailOutput<V> {
    /// The graph has one tail, or the first-tail policy picked one.
    Single { node: NodeName, value: V },
    /// Every tail's output, keyed by tail name.
    Aggregate(BTreeMap<NodeName, V>),
}

impl<V> TailOutput<V> {
    /// The single value, if this is a single-tail result.
    pub fn into_single(self) -> Option<V> {
        match self {
            TailOutput::Single { value, .. } => Some(value),
            TailOutput::Aggregate(_) => None,
        }
    }

    pub fn get(&self, tail: &str) -> Option<&V> {
        match self {
            TailOutput::Single { node, value } if node == tail => Some(value),
            TailOutput::Single { .. } => None,
            TailOutput::Aggregate(map) => map.get(tail),
        }
    }

    /// Flatten into a map from tail name to output.
    pub fn into_map(self) -> BTreeMap<NodeName, V> {
        match self {
            TailOutput::Single { node, value } => BTreeMap::from([(node, value)]),
            TailOutput::Aggregate(map) => map,
        }
    }
}

/// The value a task's completion slot is resolved with.
pub type TaskResult<V> = std::result::Result<TailOutput<V>, TaskFailure>;

pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod node;
pub mod runtime;
pub mod sink;

pub use context::{ContextRegistry, NodeState, TaskContext, TaskSnapshot};
pub use dispatcher::{DispatchOptions, Dispatcher, TaskHandle};
pub use runtime::{Runtime, RuntimeEvent, RuntimeHandle, RuntimeStats};
pub use sink::{ChannelSink, FnSink, PrintSink, ResultSink};
