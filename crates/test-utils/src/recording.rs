use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use jobgraph::dag::{Invocation, Job, JobFuture, JobInput};
use jobgraph::engine::TaskId;

/// One recorded job invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub task_id: TaskId,
    pub node: String,
    pub input: JobInput<String>,
}

/// Shared log of every invocation made through its [`RecordingJob`]s.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job that records into this recorder and traces its path.
    pub fn job(&self) -> RecordingJob {
        RecordingJob {
            recorder: self.clone(),
            delay: None,
            jitter: None,
            behaviour: Behaviour::Succeed,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task_id: &TaskId) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| &c.task_id == task_id)
            .collect()
    }

    /// How many times `node` ran for `task_id`.
    pub fn count(&self, task_id: &TaskId, node: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.task_id == task_id && c.node == node)
            .count()
    }

    pub fn invoked(&self, task_id: &TaskId, node: &str) -> bool {
        self.count(task_id, node) > 0
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

/// Test job over `String` values.
///
/// Its output is its input values joined with `+`, followed by `>` and the
/// job's own name. A chain A -> B fed `"x"` therefore yields `"x>A>B"`, and
/// a diamond A -> {B, C} -> D yields `"x>A>B+x>A>C>D"`.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    recorder: Recorder,
    delay: Option<Duration>,
    jitter: Option<Duration>,
    behaviour: Behaviour,
}

impl RecordingJob {
    /// Sleep for `delay` before producing a result.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep for a pseudo-random duration below `max`, derived from the task
    /// id and job name, so completion order varies between tasks.
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.jitter = Some(max);
        self
    }

    /// Return an error instead of an output.
    pub fn failing(mut self) -> Self {
        self.behaviour = Behaviour::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    fn pause(&self, call: &Invocation) -> Duration {
        let mut pause = self.delay.unwrap_or_default();
        if let Some(max) = self.jitter {
            let mut hasher = DefaultHasher::new();
            call.task_id.hash(&mut hasher);
            call.node.hash(&mut hasher);
            let max_ms = max.as_millis().max(1) as u64;
            pause += Duration::from_millis(hasher.finish() % max_ms);
        }
        pause
    }
}

impl Job<String> for RecordingJob {
    fn run<'a>(&'a self, call: &'a Invocation, input: JobInput<String>) -> JobFuture<'a, String> {
        Box::pin(async move {
            self.recorder.record(Call {
                task_id: call.task_id.clone(),
                node: call.node.clone(),
                input: input.clone(),
            });

            let pause = self.pause(call);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            match self.behaviour {
                Behaviour::Succeed => {
                    Ok(format!("{}>{}", input.into_values().join("+"), call.node))
                }
                Behaviour::Fail => Err(anyhow!("{} failed for task {}", call.node, call.task_id)),
                Behaviour::Panic => panic!("{} panicked for task {}", call.node, call.task_id),
            }
        })
    }
}
