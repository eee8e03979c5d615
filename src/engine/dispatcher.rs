// src/engine/dispatcher.rs

//! Task admission and result delivery.
//!
//! [`Dispatcher::submit`] creates the task's context, starts every head job
//! and hands back a [`TaskHandle`]. The handle is the only thing that waits:
//! it awaits the context's completion slot and drops the context when it is
//! consumed or dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::{JobGraph, JobValue};
use crate::engine::coordinator::Coordinator;
use crate::engine::{
    ContextRegistry, TailOutput, Task, TaskContext, TaskId, TaskResult, TaskSnapshot,
};
use crate::errors::{ContextError, TaskFailure};

/// Knobs applied to every task a dispatcher admits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Resolve a task as timed out if it has not completed within this.
    pub task_timeout: Option<Duration>,
    /// Upper bound on job bodies running at once, across all tasks.
    pub max_concurrent_jobs: Option<usize>,
}

/// Entry point for running tasks through one job graph.
///
/// Cheap to clone; clones share the graph and the set of live contexts.
pub struct Dispatcher<V> {
    coordinator: Coordinator<V>,
    registry: Arc<ContextRegistry<V>>,
    options: DispatchOptions,
}

impl<V> Clone for Dispatcher<V> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            registry: Arc::clone(&self.registry),
            options: self.options,
        }
    }
}

impl<V: JobValue> Dispatcher<V> {
    pub fn new(graph: impl Into<Arc<JobGraph<V>>>) -> Self {
        Self::with_options(graph, DispatchOptions::default())
    }

    pub fn with_options(graph: impl Into<Arc<JobGraph<V>>>, options: DispatchOptions) -> Self {
        Self {
            coordinator: Coordinator::new(graph.into(), options.max_concurrent_jobs),
            registry: Arc::new(ContextRegistry::new()),
            options,
        }
    }

    pub fn graph(&self) -> &Arc<JobGraph<V>> {
        self.coordinator.graph()
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Admit `task` and start its head jobs.
    ///
    /// Must be called from within a tokio runtime. Fails if a task with the
    /// same id is still in flight.
    pub fn submit(&self, task: Task<V>) -> Result<TaskHandle<V>, ContextError> {
        let Task { id, payload } = task;
        let (ctx, rx) = self.registry.create(id, self.coordinator.graph())?;

        info!(
            task_id = %ctx.task_id(),
            heads = self.coordinator.graph().heads().len(),
            "task admitted"
        );

        let deadline = self
            .options
            .task_timeout
            .map(|after| spawn_deadline(Arc::downgrade(&ctx), after));

        self.coordinator.start(&ctx, payload);

        Ok(TaskHandle {
            ctx,
            rx,
            registry: Arc::clone(&self.registry),
            deadline,
        })
    }

    /// Submit `task` and wait for its result.
    pub async fn run(&self, task: Task<V>) -> crate::errors::Result<TailOutput<V>> {
        self.submit(task)?.wait().await
    }

    pub fn snapshot(&self, task_id: &TaskId) -> Result<TaskSnapshot<V>, ContextError> {
        self.registry
            .get(task_id)
            .map(|ctx| ctx.snapshot())
            .ok_or_else(|| ContextError::UnknownTask(task_id.clone()))
    }

    /// Number of tasks whose handles are still alive.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    pub fn is_in_flight(&self, task_id: &TaskId) -> bool {
        self.registry.contains(task_id)
    }
}

fn spawn_deadline<V: JobValue>(ctx: Weak<TaskContext<V>>, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;

        let Some(ctx) = ctx.upgrade() else {
            return;
        };
        let failure = TaskFailure::Timeout {
            task_id: ctx.task_id().clone(),
            after,
        };
        if ctx.resolve(Err(failure)) {
            warn!(task_id = %ctx.task_id(), ?after, "task timed out");
        }
    })
}

/// Owner of one in-flight task.
///
/// Dropping the handle (or consuming it with [`TaskHandle::wait`]) removes the
/// task's context from the dispatcher. Jobs already running finish on their
/// own, but their outputs go nowhere.
pub struct TaskHandle<V> {
    ctx: Arc<TaskContext<V>>,
    rx: oneshot::Receiver<TaskResult<V>>,
    registry: Arc<ContextRegistry<V>>,
    deadline: Option<JoinHandle<()>>,
}

impl<V: JobValue> TaskHandle<V> {
    pub fn task_id(&self) -> &TaskId {
        self.ctx.task_id()
    }

    pub fn snapshot(&self) -> TaskSnapshot<V> {
        self.ctx.snapshot()
    }

    /// Wait for the task's completion slot to be resolved.
    pub async fn wait(mut self) -> crate::errors::Result<TailOutput<V>> {
        match (&mut self.rx).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(failure)) => Err(failure.into()),
            Err(_) => Err(ContextError::Abandoned(self.ctx.task_id().clone()).into()),
        }
    }
}

impl<V> Drop for TaskHandle<V> {
    fn drop(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
        if self.registry.remove(&self.ctx) {
            debug!(task_id = %self.ctx.task_id(), "task context dropped");
        }
    }
}
