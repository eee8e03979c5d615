// src/engine/context.rs

//! Per-task execution state.
//!
//! Every admitted task gets exactly one [`TaskContext`]. It is the only place
//! where mutable per-task data lives: pending-parent counters, collected
//! parent outputs, job results and the single-assignment completion slot.
//! Jobs and the graph stay immutable and shared.
//!
//! Synchronisation is per field rather than per context:
//! - `pending` is an atomic counter; decrement-and-test is one step.
//! - `state` is an atomic, so `Ready -> Running` happens at most once.
//! - inputs, results and tail outputs sit behind short-lived mutexes.
//! - the completion sender is taken out of its slot exactly once.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use crate::dag::{JobGraph, JobValue};
use crate::engine::{NodeName, TaskId, TaskResult};
use crate::errors::{ContextError, InvariantViolation};

/// Lifecycle of one job within one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Some parents have not completed yet.
    Waiting,
    /// All parents completed; not yet dispatched.
    Ready,
    /// Dispatched; `run` is in flight.
    Running,
    Succeeded,
    Failed,
}

impl NodeState {
    fn as_u8(self) -> u8 {
        match self {
            NodeState::Waiting => 0,
            NodeState::Ready => 1,
            NodeState::Running => 2,
            NodeState::Succeeded => 3,
            NodeState::Failed => 4,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => NodeState::Waiting,
            1 => NodeState::Ready,
            2 => NodeState::Running,
            3 => NodeState::Succeeded,
            _ => NodeState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct NodeSlot<V> {
    pending: AtomicUsize,
    state: AtomicU8,
    inputs: Mutex<BTreeMap<NodeName, V>>,
    result: Mutex<Option<V>>,
}

/// Isolated state of one task's traversal of the graph.
pub struct TaskContext<V> {
    task_id: TaskId,
    nodes: HashMap<NodeName, NodeSlot<V>>,
    remaining_tails: AtomicUsize,
    tail_outputs: Mutex<BTreeMap<NodeName, V>>,
    resolved: AtomicBool,
    completion: Mutex<Option<oneshot::Sender<TaskResult<V>>>>,
    started: Instant,
}

impl<V> TaskContext<V> {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub fn remaining_tails(&self) -> usize {
        self.remaining_tails.load(Ordering::Acquire)
    }
}

impl<V: JobValue> TaskContext<V> {
    /// Create the context for `task_id`, returning the receiving side of its
    /// completion slot.
    ///
    /// Every job starts with `pending` equal to its parent count; head jobs
    /// start out `Ready`.
    pub fn new(
        task_id: TaskId,
        graph: &JobGraph<V>,
    ) -> (Self, oneshot::Receiver<TaskResult<V>>) {
        let (tx, rx) = oneshot::channel();

        let nodes = graph
            .nodes()
            .map(|node| {
                let pending = node.parents().len();
                let state = if pending == 0 {
                    NodeState::Ready
                } else {
                    NodeState::Waiting
                };
                let slot = NodeSlot {
                    pending: AtomicUsize::new(pending),
                    state: AtomicU8::new(state.as_u8()),
                    inputs: Mutex::new(BTreeMap::new()),
                    result: Mutex::new(None),
                };
                (node.name().to_string(), slot)
            })
            .collect();

        let ctx = Self {
            task_id,
            nodes,
            remaining_tails: AtomicUsize::new(graph.tails().len()),
            tail_outputs: Mutex::new(BTreeMap::new()),
            resolved: AtomicBool::new(false),
            completion: Mutex::new(Some(tx)),
            started: Instant::now(),
        };

        (ctx, rx)
    }

    fn slot(&self, node: &str) -> Result<&NodeSlot<V>, InvariantViolation> {
        self.nodes
            .get(node)
            .ok_or_else(|| InvariantViolation::UnknownNode {
                task_id: self.task_id.clone(),
                node: node.to_string(),
            })
    }

    pub fn state_of(&self, node: &str) -> Option<NodeState> {
        self.nodes
            .get(node)
            .map(|slot| NodeState::from_u8(slot.state.load(Ordering::Acquire)))
    }

    pub fn pending_of(&self, node: &str) -> Option<usize> {
        self.nodes
            .get(node)
            .map(|slot| slot.pending.load(Ordering::Acquire))
    }

    pub fn result_of(&self, node: &str) -> Option<V> {
        self.nodes.get(node).and_then(|slot| lock(&slot.result).clone())
    }

    /// Claim `node` for execution: `Ready -> Running`, exactly once.
    pub(crate) fn begin_run(&self, node: &str) -> Result<(), InvariantViolation> {
        let slot = self.slot(node)?;
        slot.state
            .compare_exchange(
                NodeState::Ready.as_u8(),
                NodeState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| InvariantViolation::DoubleInvocation {
                task_id: self.task_id.clone(),
                node: node.to_string(),
            })
    }

    pub(crate) fn finish(&self, node: &str, success: bool) {
        if let Ok(slot) = self.slot(node) {
            let state = if success {
                NodeState::Succeeded
            } else {
                NodeState::Failed
            };
            slot.state.store(state.as_u8(), Ordering::Release);
        }
    }

    pub(crate) fn record_result(&self, node: &str, value: V) {
        if let Ok(slot) = self.slot(node) {
            *lock(&slot.result) = Some(value);
        }
    }

    /// Store `parent`'s output as input for `child` and count the parent
    /// down.
    ///
    /// Returns `true` for exactly one caller per child: the one whose
    /// decrement brought `pending` to zero. That caller owns dispatching the
    /// child.
    pub(crate) fn deliver_input(
        &self,
        child: &str,
        parent: &str,
        value: V,
    ) -> Result<bool, InvariantViolation> {
        let slot = self.slot(child)?;

        // Insert before decrementing: whoever observes zero must see every input.
        lock(&slot.inputs).insert(parent.to_string(), value);

        let previous = slot
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| InvariantViolation::PendingUnderflow {
                task_id: self.task_id.clone(),
                node: child.to_string(),
            })?;

        if previous != 1 {
            return Ok(false);
        }

        slot.state
            .compare_exchange(
                NodeState::Waiting.as_u8(),
                NodeState::Ready.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| true)
            .map_err(|_| InvariantViolation::DoubleInvocation {
                task_id: self.task_id.clone(),
                node: child.to_string(),
            })
    }

    /// Move the collected parent outputs out of `node`'s slot.
    pub(crate) fn take_inputs(&self, node: &str) -> BTreeMap<NodeName, V> {
        match self.slot(node) {
            Ok(slot) => std::mem::take(&mut *lock(&slot.inputs)),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Record a tail output. Returns every tail output once the last tail
    /// has reported.
    pub(crate) fn complete_tail(&self, node: &str, value: V) -> Option<BTreeMap<NodeName, V>> {
        lock(&self.tail_outputs).insert(node.to_string(), value);

        if self.tail_finished()? == 0 {
            Some(std::mem::take(&mut *lock(&self.tail_outputs)))
        } else {
            None
        }
    }

    /// Count one tail as finished without keeping its output.
    ///
    /// Returns the number of tails still outstanding, or `None` if every tail
    /// had already been counted.
    pub(crate) fn tail_finished(&self) -> Option<usize> {
        self.remaining_tails
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    /// Resolve the completion slot.
    ///
    /// Returns `false` if it was already resolved; the earlier value is kept.
    pub(crate) fn resolve(&self, result: TaskResult<V>) -> bool {
        let Some(tx) = lock(&self.completion).take() else {
            return false;
        };
        self.resolved.store(true, Ordering::Release);

        if tx.send(result).is_err() {
            debug!(
                task_id = %self.task_id,
                "task resolved but nobody is waiting for it any more"
            );
        }
        true
    }

    pub fn snapshot(&self) -> TaskSnapshot<V> {
        let mut states = BTreeMap::new();
        let mut results = BTreeMap::new();

        for (name, slot) in &self.nodes {
            states.insert(
                name.clone(),
                NodeState::from_u8(slot.state.load(Ordering::Acquire)),
            );
            if let Some(value) = lock(&slot.result).clone() {
                results.insert(name.clone(), value);
            }
        }

        TaskSnapshot {
            task_id: self.task_id.clone(),
            states,
            results,
            remaining_tails: self.remaining_tails(),
            resolved: self.is_resolved(),
        }
    }
}

/// Point-in-time copy of a task's context, for diagnostics.
#[derive(Debug, Clone)]
pub struct TaskSnapshot<V> {
    pub task_id: TaskId,
    pub states: BTreeMap<NodeName, NodeState>,
    pub results: BTreeMap<NodeName, V>,
    pub remaining_tails: usize,
    pub resolved: bool,
}

/// Live contexts keyed by task id.
///
/// Admission goes through [`ContextRegistry::create`], which checks and
/// inserts under one lock, so two tasks can never end up sharing a context.
pub struct ContextRegistry<V> {
    contexts: Mutex<HashMap<TaskId, Arc<TaskContext<V>>>>,
}

impl<V> Default for ContextRegistry<V> {
    fn default() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: JobValue> ContextRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        task_id: TaskId,
        graph: &JobGraph<V>,
    ) -> Result<(Arc<TaskContext<V>>, oneshot::Receiver<TaskResult<V>>), ContextError> {
        let mut contexts = lock(&self.contexts);
        if contexts.contains_key(&task_id) {
            return Err(ContextError::DuplicateTask(task_id));
        }

        let (ctx, rx) = TaskContext::new(task_id.clone(), graph);
        let ctx = Arc::new(ctx);
        contexts.insert(task_id, Arc::clone(&ctx));
        Ok((ctx, rx))
    }
}

impl<V> ContextRegistry<V> {
    pub fn get(&self, task_id: &TaskId) -> Option<Arc<TaskContext<V>>> {
        lock(&self.contexts).get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        lock(&self.contexts).contains_key(task_id)
    }

    /// Drop `ctx` from the registry, but only if it is still the context
    /// registered under its id.
    pub fn remove(&self, ctx: &Arc<TaskContext<V>>) -> bool {
        let mut contexts = lock(&self.contexts);
        match contexts.get(ctx.task_id()) {
            Some(current) if Arc::ptr_eq(current, ctx) => {
                contexts.remove(ctx.task_id());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.contexts).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.contexts).is_empty()
    }
}
