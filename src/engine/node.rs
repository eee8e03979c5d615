// src/engine/node.rs

//! Invocation wrapper around a single job.
//!
//! Converts whatever the job does (return a value, return an error, panic,
//! or hang past its timeout) into an [`Outcome`]. The coordinator never has
//! to deal with anything else.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::dag::{Invocation, JobInput, JobNode, JobValue};
use crate::engine::{Outcome, TaskId};

/// Run `node`'s job for `task_id` with the combined `input`.
pub(crate) async fn invoke<V: JobValue>(
    node: &JobNode<V>,
    task_id: &TaskId,
    input: JobInput<V>,
) -> Outcome<V> {
    if let Err(err) = check_input(node, &input) {
        return Outcome::Failure(err);
    }

    let name = node.name().to_string();
    let call = Invocation {
        task_id: task_id.clone(),
        node: name.clone(),
    };
    let job = Arc::clone(node.job());

    debug!(task_id = %task_id, node = %name, "invoking job");

    // Own tokio task so a panicking job surfaces as a JoinError.
    let mut handle = tokio::spawn(async move { job.run(&call, input).await });

    let joined = match node.timeout() {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Outcome::Failure(anyhow!("job '{name}' timed out after {limit:?}"));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(err)) => Outcome::Failure(err),
        Err(err) if err.is_panic() => Outcome::Failure(anyhow!(
            "job '{name}' panicked: {}",
            panic_message(err.into_panic())
        )),
        Err(err) => Outcome::Failure(anyhow!("job '{name}' was cancelled: {err}")),
    }
}

/// Heads take the payload; everyone else takes exactly its parents' outputs.
fn check_input<V>(node: &JobNode<V>, input: &JobInput<V>) -> anyhow::Result<()> {
    match input {
        JobInput::Payload(_) if node.is_head() => Ok(()),
        JobInput::Payload(_) => Err(anyhow!(
            "job '{}' has parents but was given the task payload",
            node.name()
        )),
        JobInput::Parents(values) => {
            let given: BTreeSet<&str> = values.keys().map(|k| k.as_str()).collect();
            let expected: BTreeSet<&str> = node.parents().iter().map(|p| p.as_str()).collect();
            if given == expected && !expected.is_empty() {
                Ok(())
            } else {
                Err(anyhow!(
                    "job '{}' expected inputs from {:?} but got {:?}",
                    node.name(),
                    expected,
                    given
                ))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::dag::{job_fn, JobGraph};

    fn graph_with(job: impl crate::dag::Job<u32> + 'static) -> JobGraph<u32> {
        JobGraph::builder()
            .job("head", job_fn(|_: JobInput<u32>| async { Ok(1) }))
            .job("child", job)
            .edge("head", "child")
            .build()
            .unwrap()
    }

    fn parents(value: u32) -> JobInput<u32> {
        JobInput::Parents(BTreeMap::from([("head".to_string(), value)]))
    }

    #[tokio::test]
    async fn success_is_passed_through() {
        let graph = graph_with(job_fn(|input: JobInput<u32>| async move {
            Ok(input.parent("head").copied().unwrap_or_default() * 10)
        }));

        let outcome = invoke(graph.node("child").unwrap(), &TaskId::from("t"), parents(4)).await;
        match outcome {
            Outcome::Success(v) => assert_eq!(v, 40),
            Outcome::Failure(err) => panic!("unexpected failure: {err:#}"),
        }
    }

    #[tokio::test]
    async fn error_becomes_failure() {
        let graph = graph_with(job_fn(|_: JobInput<u32>| async { Err(anyhow!("boom")) }));

        let outcome = invoke(graph.node("child").unwrap(), &TaskId::from("t"), parents(1)).await;
        assert!(matches!(outcome, Outcome::Failure(err) if err.to_string() == "boom"));
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let graph = graph_with(job_fn(|_: JobInput<u32>| async {
            if true {
                panic!("job exploded");
            }
            Ok(0)
        }));

        let outcome = invoke(graph.node("child").unwrap(), &TaskId::from("t"), parents(1)).await;
        match outcome {
            Outcome::Failure(err) => assert!(err.to_string().contains("job exploded")),
            Outcome::Success(_) => panic!("panicking job reported success"),
        }
    }

    #[tokio::test]
    async fn node_timeout_becomes_failure() {
        let graph = JobGraph::builder()
            .job_with_timeout(
                "slow",
                job_fn(|_: JobInput<u32>| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(0)
                }),
                Duration::from_millis(20),
            )
            .build()
            .unwrap();

        let outcome = invoke(
            graph.node("slow").unwrap(),
            &TaskId::from("t"),
            JobInput::Payload(0),
        )
        .await;
        match outcome {
            Outcome::Failure(err) => assert!(err.to_string().contains("timed out")),
            Outcome::Success(_) => panic!("slow job should have timed out"),
        }
    }

    #[tokio::test]
    async fn mismatched_inputs_are_rejected() {
        let graph = graph_with(job_fn(|_: JobInput<u32>| async { Ok(0) }));
        let child = graph.node("child").unwrap();

        let payload = invoke(child, &TaskId::from("t"), JobInput::Payload(1)).await;
        assert!(!payload.is_success());

        let wrong = JobInput::Parents(BTreeMap::from([("other".to_string(), 1)]));
        let outcome = invoke(child, &TaskId::from("t"), wrong).await;
        assert!(!outcome.is_success());
    }
}
