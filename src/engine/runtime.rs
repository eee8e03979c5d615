// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dag::JobValue;
use crate::engine::{Dispatcher, ResultSink, TailOutput, Task, TaskId};
use crate::errors::{JobGraphError, Result};

/// Input to the runtime loop.
pub enum RuntimeEvent<V> {
    /// Run `task` through the graph registered as `graph`, or through the
    /// only registered graph when `graph` is `None`.
    Submit { graph: Option<String>, task: Task<V> },
    /// No more tasks will arrive; exit once every admitted task is delivered.
    InputCompleted,
    /// Stop now, abandoning tasks still in flight.
    ShutdownRequested,
}

impl<V> fmt::Debug for RuntimeEvent<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEvent::Submit { graph, task } => f
                .debug_struct("Submit")
                .field("graph", graph)
                .field("task_id", &task.id)
                .finish_non_exhaustive(),
            RuntimeEvent::InputCompleted => f.write_str("InputCompleted"),
            RuntimeEvent::ShutdownRequested => f.write_str("ShutdownRequested"),
        }
    }
}

/// Counters reported when the runtime exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks refused at admission (unknown graph, duplicate id, late input).
    pub rejected: usize,
}

/// Sending side of a runtime's event channel.
pub struct RuntimeHandle<V> {
    tx: mpsc::Sender<RuntimeEvent<V>>,
    next_id: Arc<AtomicU64>,
}

impl<V> Clone for RuntimeHandle<V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<V: JobValue> RuntimeHandle<V> {
    pub fn new(tx: mpsc::Sender<RuntimeEvent<V>>) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a bounded event channel and the handle feeding it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RuntimeEvent<V>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn submit(&self, task: Task<V>) -> Result<()> {
        self.send(RuntimeEvent::Submit { graph: None, task }).await
    }

    pub async fn submit_to(&self, graph: impl Into<String>, task: Task<V>) -> Result<()> {
        self.send(RuntimeEvent::Submit {
            graph: Some(graph.into()),
            task,
        })
        .await
    }

    /// Submit `payload` under a generated id (`task-1`, `task-2`, ...).
    pub async fn submit_payload(&self, payload: V) -> Result<TaskId> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = TaskId::new(format!("task-{n}"));
        self.submit(Task::new(id.clone(), payload)).await?;
        Ok(id)
    }

    pub async fn mark_input_completed(&self) -> Result<()> {
        self.send(RuntimeEvent::InputCompleted).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(RuntimeEvent::ShutdownRequested).await
    }

    async fn send(&self, event: RuntimeEvent<V>) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| JobGraphError::RuntimeClosed)
    }
}

/// Long-running intake loop.
///
/// Routes submitted tasks to named graphs, awaits them concurrently and
/// hands every result to a [`ResultSink`] as soon as it is available.
pub struct Runtime<V, S> {
    event_rx: mpsc::Receiver<RuntimeEvent<V>>,
    graphs: BTreeMap<String, Dispatcher<V>>,
    sink: S,
    stats: RuntimeStats,
}

impl<V, S> fmt::Debug for Runtime<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("graphs", &self.graphs.keys().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

type Delivery<V> = (TaskId, Result<TailOutput<V>>);

impl<V: JobValue, S: ResultSink<V>> Runtime<V, S> {
    pub fn new(event_rx: mpsc::Receiver<RuntimeEvent<V>>, sink: S) -> Self {
        Self {
            event_rx,
            graphs: BTreeMap::new(),
            sink,
            stats: RuntimeStats::default(),
        }
    }

    /// Register `dispatcher` under `name`.
    pub fn with_graph(mut self, name: impl Into<String>, dispatcher: Dispatcher<V>) -> Self {
        self.graphs.insert(name.into(), dispatcher);
        self
    }

    /// Main event loop.
    ///
    /// - Admits submitted tasks and awaits them concurrently.
    /// - Delivers each result to the sink in completion order.
    /// - After `InputCompleted` (or when every handle is dropped), drains the
    ///   tasks still in flight and returns.
    /// - After `ShutdownRequested`, aborts whatever is in flight and returns.
    pub async fn run(mut self) -> Result<RuntimeStats> {
        info!(graphs = ?self.graphs.keys().collect::<Vec<_>>(), "jobgraph runtime started");

        let mut in_flight: JoinSet<Delivery<V>> = JoinSet::new();
        let mut events_open = true;
        let mut accepting = true;

        loop {
            if (!accepting || !events_open) && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                event = self.event_rx.recv(), if events_open => {
                    let Some(event) = event else {
                        info!("runtime event channel closed; draining");
                        events_open = false;
                        continue;
                    };

                    debug!(?event, "runtime received event");

                    match event {
                        RuntimeEvent::Submit { graph, task } if accepting => {
                            self.admit(graph.as_deref(), task, &mut in_flight).await?;
                        }
                        RuntimeEvent::Submit { task, .. } => {
                            warn!(task_id = %task.id, "task submitted after input completed; rejected");
                            self.stats.rejected += 1;
                        }
                        RuntimeEvent::InputCompleted => {
                            info!(in_flight = in_flight.len(), "input completed; draining");
                            accepting = false;
                        }
                        RuntimeEvent::ShutdownRequested => {
                            info!(in_flight = in_flight.len(), "shutdown requested; aborting in-flight tasks");
                            in_flight.shutdown().await;
                            break;
                        }
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok((task_id, result)) => self.deliver(task_id, result).await?,
                        Err(err) => warn!(error = %err, "task waiter ended abnormally"),
                    }
                }
            }
        }

        info!(
            submitted = self.stats.submitted,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            rejected = self.stats.rejected,
            "runtime exiting"
        );
        Ok(self.stats)
    }

    fn route(&self, graph: Option<&str>) -> Result<&Dispatcher<V>> {
        match graph {
            Some(name) => self
                .graphs
                .get(name)
                .ok_or_else(|| JobGraphError::UnknownGraph(name.to_string())),
            None if self.graphs.len() == 1 => self
                .graphs
                .values()
                .next()
                .ok_or(JobGraphError::GraphNameRequired(0)),
            None => Err(JobGraphError::GraphNameRequired(self.graphs.len())),
        }
    }

    async fn admit(
        &mut self,
        graph: Option<&str>,
        task: Task<V>,
        in_flight: &mut JoinSet<Delivery<V>>,
    ) -> Result<()> {
        let task_id = task.id.clone();

        let submitted = self
            .route(graph)
            .and_then(|dispatcher| dispatcher.submit(task).map_err(JobGraphError::from));

        match submitted {
            Ok(handle) => {
                self.stats.submitted += 1;
                in_flight.spawn(async move {
                    let task_id = handle.task_id().clone();
                    let result = handle.wait().await;
                    (task_id, result)
                });
                Ok(())
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "task rejected");
                self.stats.rejected += 1;
                self.sink.deliver(task_id, Err(err)).await
            }
        }
    }

    async fn deliver(&mut self, task_id: TaskId, result: Result<TailOutput<V>>) -> Result<()> {
        match &result {
            Ok(_) => self.stats.succeeded += 1,
            Err(err) => {
                debug!(task_id = %task_id, error = %err, "delivering task failure");
                self.stats.failed += 1;
            }
        }
        self.sink.deliver(task_id, result).await
    }
}
