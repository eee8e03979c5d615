// src/dag/job.rs

//! The job capability consumed by the engine.
//!
//! A job is a shared, stateless unit of computation. The engine calls
//! [`Job::run`] once per task that reaches the job, possibly for many tasks
//! at the same time, so implementations must not keep per-task state on
//! `self`.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::engine::{NodeName, TaskId};

/// Marker for values that can flow between jobs.
pub trait JobValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> JobValue for T {}

/// Boxed future returned by [`Job::run`].
pub type JobFuture<'a, V> = Pin<Box<dyn Future<Output = anyhow::Result<V>> + Send + 'a>>;

/// Identifies one invocation: which task, which job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub task_id: TaskId,
    pub node: NodeName,
}

/// Input handed to a job.
///
/// Head jobs receive the task's payload. Every other job receives the
/// outputs of all of its parents keyed by parent name, so the combined input
/// does not depend on the order in which the parents finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInput<V> {
    Payload(V),
    Parents(BTreeMap<NodeName, V>),
}

impl<V> JobInput<V> {
    pub fn payload(&self) -> Option<&V> {
        match self {
            JobInput::Payload(v) => Some(v),
            JobInput::Parents(_) => None,
        }
    }

    pub fn parent(&self, name: &str) -> Option<&V> {
        match self {
            JobInput::Payload(_) => None,
            JobInput::Parents(map) => map.get(name),
        }
    }

    pub fn parents(&self) -> Option<&BTreeMap<NodeName, V>> {
        match self {
            JobInput::Payload(_) => None,
            JobInput::Parents(map) => Some(map),
        }
    }

    /// All values in deterministic order (parent name order).
    pub fn into_values(self) -> Vec<V> {
        match self {
            JobInput::Payload(v) => vec![v],
            JobInput::Parents(map) => map.into_values().collect(),
        }
    }
}

/// The single capability the engine needs from a job.
pub trait Job<V>: Send + Sync {
    fn run<'a>(&'a self, call: &'a Invocation, input: JobInput<V>) -> JobFuture<'a, V>;
}

/// Adapter turning an async closure into a [`Job`].
pub struct FnJob<F> {
    f: F,
}

impl<V, F, Fut> Job<V> for FnJob<F>
where
    V: Send + 'static,
    F: Fn(JobInput<V>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    fn run<'a>(&'a self, _call: &'a Invocation, input: JobInput<V>) -> JobFuture<'a, V> {
        Box::pin((self.f)(input))
    }
}

/// Wrap an async closure as a job.
///
/// ```no_run
/// use jobgraph::dag::{job_fn, JobInput};
///
/// let upper = job_fn(|input: JobInput<String>| async move {
///     Ok(input.into_values().concat().to_uppercase())
/// });
/// # let _ = upper;
/// ```
pub fn job_fn<V, F, Fut>(f: F) -> FnJob<F>
where
    V: Send + 'static,
    F: Fn(JobInput<V>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    FnJob { f }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_job_forwards_input() {
        let job = job_fn(|input: JobInput<u32>| async move {
            Ok(input.into_values().into_iter().sum::<u32>())
        });
        let call = Invocation {
            task_id: TaskId::from("t"),
            node: "sum".to_string(),
        };

        let mut parents = BTreeMap::new();
        parents.insert("a".to_string(), 2);
        parents.insert("b".to_string(), 3);

        let out = job.run(&call, JobInput::Parents(parents)).await.unwrap();
        assert_eq!(out, 5);
    }

    #[test]
    fn parents_are_iterated_in_name_order() {
        let mut parents = BTreeMap::new();
        parents.insert("z".to_string(), "last");
        parents.insert("a".to_string(), "first");
        let input = JobInput::Parents(parents);

        assert_eq!(input.parent("a"), Some(&"first"));
        assert!(input.payload().is_none());
        assert_eq!(input.into_values(), vec!["first", "last"]);
    }
}
