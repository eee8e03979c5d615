// src/engine/coordinator.rs

//! Fan-out / fan-in scheduling of jobs within a task.
//!
//! Every job invocation runs as its own tokio task that owns an `Arc` of the
//! context it belongs to. When the job completes, that same task records the
//! result, hands it to each child and spawns any child whose last parent just
//! finished. Nothing ever waits on a child, so there is no chain of awaited
//! calls for a result to travel back through.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::dag::{JobGraph, JobInput, JobValue};
use crate::engine::node::invoke;
use crate::engine::{NodeName, Outcome, TailOutput, TaskContext};
use crate::errors::{InvariantViolation, NodeFailure};
use crate::types::TailPolicy;

pub(crate) struct Coordinator<V> {
    graph: Arc<JobGraph<V>>,
    limiter: Option<Arc<Semaphore>>,
}

impl<V> Clone for Coordinator<V> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            limiter: self.limiter.clone(),
        }
    }
}

impl<V: JobValue> Coordinator<V> {
    /// `max_concurrent_jobs` bounds job bodies in flight across all tasks.
    pub(crate) fn new(graph: Arc<JobGraph<V>>, max_concurrent_jobs: Option<usize>) -> Self {
        Self {
            graph,
            limiter: max_concurrent_jobs.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    pub(crate) fn graph(&self) -> &Arc<JobGraph<V>> {
        &self.graph
    }

    /// Dispatch every head job of a freshly created context.
    pub(crate) fn start(&self, ctx: &Arc<TaskContext<V>>, payload: V) {
        for head in self.graph.heads() {
            self.dispatch(Arc::clone(ctx), head.clone(), JobInput::Payload(payload.clone()));
        }
    }

    fn dispatch(&self, ctx: Arc<TaskContext<V>>, node: NodeName, input: JobInput<V>) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_node(ctx, node, input).await;
        });
    }

    async fn run_node(self, ctx: Arc<TaskContext<V>>, node: NodeName, input: JobInput<V>) {
        let task_id = ctx.task_id().clone();

        let Some(job_node) = self.graph.node(&node) else {
            let violation = InvariantViolation::UnknownNode { task_id, node };
            fail_invariant(&ctx, violation);
            return;
        };

        let permit = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return,
            },
            None => None,
        };

        if ctx.is_resolved() {
            debug!(task_id = %task_id, node = %node, "task already resolved; job skipped");
            return;
        }

        if let Err(violation) = ctx.begin_run(&node) {
            fail_invariant(&ctx, violation);
            return;
        }

        let outcome = invoke(job_node, &task_id, input).await;
        drop(permit);

        self.on_completion(&ctx, &node, outcome);
    }

    fn on_completion(&self, ctx: &Arc<TaskContext<V>>, node: &str, outcome: Outcome<V>) {
        let task_id = ctx.task_id();

        let value = match outcome {
            Outcome::Success(value) => value,
            Outcome::Failure(source) => {
                ctx.finish(node, false);
                let failure = NodeFailure {
                    node: node.to_string(),
                    task_id: task_id.clone(),
                    source,
                };
                let message = failure.to_string();
                if ctx.resolve(Err(failure.into())) {
                    warn!(task_id = %task_id, node, error = %message, "job failed; task failed");
                } else {
                    debug!(task_id = %task_id, node, error = %message, "job failed after task was resolved");
                }
                return;
            }
        };

        ctx.finish(node, true);
        debug!(task_id = %task_id, node, "job succeeded");

        if ctx.is_resolved() {
            if self.graph.is_tail(node) {
                ctx.tail_finished();
            }
            debug!(task_id = %task_id, node, "task already resolved; output dropped");
            return;
        }

        ctx.record_result(node, value.clone());

        if self.graph.is_tail(node) {
            self.complete_tail(ctx, node, value);
            return;
        }

        for child in self.graph.children_of(node) {
            match ctx.deliver_input(child, node, value.clone()) {
                Ok(true) => {
                    let inputs = ctx.take_inputs(child);
                    debug!(task_id = %task_id, node = %child, parent = node, "job ready");
                    self.dispatch(Arc::clone(ctx), child.clone(), JobInput::Parents(inputs));
                }
                Ok(false) => {}
                Err(violation) => {
                    fail_invariant(ctx, violation);
                    return;
                }
            }
        }
    }

    fn complete_tail(&self, ctx: &Arc<TaskContext<V>>, node: &str, value: V) {
        let output = match self.graph.tail_policy() {
            TailPolicy::First => {
                ctx.tail_finished();
                TailOutput::Single {
                    node: node.to_string(),
                    value,
                }
            }
            TailPolicy::All => {
                let Some(mut outputs) = ctx.complete_tail(node, value) else {
                    debug!(
                        task_id = %ctx.task_id(),
                        node,
                        remaining = ctx.remaining_tails(),
                        "tail finished; waiting for other tails"
                    );
                    return;
                };
                if self.graph.tails().len() == 1 {
                    match outputs.pop_first() {
                        Some((node, value)) => TailOutput::Single { node, value },
                        None => return,
                    }
                } else {
                    TailOutput::Aggregate(outputs)
                }
            }
        };

        if ctx.resolve(Ok(output)) {
            info!(
                task_id = %ctx.task_id(),
                node,
                elapsed_ms = ctx.elapsed().as_millis() as u64,
                "task completed"
            );
        }
    }
}

/// Fail the task instead of leaving its handle waiting on a slot nobody
/// will fill.
fn fail_invariant<V: JobValue>(ctx: &TaskContext<V>, violation: InvariantViolation) {
    error!(
        task_id = %ctx.task_id(),
        node = violation.node(),
        %violation,
        "invariant violation"
    );
    ctx.resolve(Err(violation.into()));
}
