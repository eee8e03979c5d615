// tests/properties.rs

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::Recorder;
use jobgraph::dag::JobGraph;
use jobgraph::engine::{Dispatcher, Task, TaskId};
use proptest::prelude::*;

/// Random DAG over `n00..nNN`: job `i` may only depend on jobs `0..i`, so the
/// result is acyclic and every job is reachable from some head.
fn dag_strategy(max_jobs: usize) -> impl Strategy<Value = BTreeMap<String, BTreeSet<String>>> {
    (1..=max_jobs).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n).prop_map(
            move |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, deps)| {
                        let parents = deps
                            .into_iter()
                            .filter(|_| i > 0)
                            .map(|d| format!("n{:02}", d % i))
                            .collect();
                        (format!("n{i:02}"), parents)
                    })
                    .collect()
            },
        )
    })
}

/// What a recording job's output must be, computed without the engine.
fn expected_output(
    node: &str,
    payload: &str,
    parents: &BTreeMap<String, BTreeSet<String>>,
    memo: &mut BTreeMap<String, String>,
) -> String {
    if let Some(done) = memo.get(node) {
        return done.clone();
    }
    let deps = &parents[node];
    let input = if deps.is_empty() {
        payload.to_string()
    } else {
        deps.iter()
            .map(|p| expected_output(p, payload, parents, memo))
            .collect::<Vec<_>>()
            .join("+")
    };
    let out = format!("{input}>{node}");
    memo.insert(node.to_string(), out.clone());
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_job_runs_once_and_outputs_are_deterministic(
        parents in dag_strategy(8),
        tasks in 1..6usize,
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let recorder = Recorder::new();
        let mut builder = JobGraph::builder();
        for (name, deps) in &parents {
            builder = builder.job(name.clone(), recorder.job());
            for dep in deps {
                builder = builder.edge(dep.clone(), name.clone());
            }
        }
        let graph = builder.build().unwrap();
        let tails: Vec<String> = graph.tails().to_vec();
        let dispatcher = Dispatcher::new(graph);

        let outputs = rt.block_on(async {
            let handles: Vec<_> = (0..tasks)
                .map(|i| dispatcher.submit(Task::new(format!("t{i}"), format!("p{i}"))).unwrap())
                .collect();
            let mut outputs = Vec::new();
            for handle in handles {
                outputs.push(handle.wait().await.unwrap().into_map());
            }
            outputs
        });

        for (i, got) in outputs.into_iter().enumerate() {
            let payload = format!("p{i}");
            let mut memo = BTreeMap::new();
            let expected: BTreeMap<String, String> = tails
                .iter()
                .map(|t| (t.clone(), expected_output(t, &payload, &parents, &mut memo)))
                .collect();
            prop_assert_eq!(got, expected);

            let id = TaskId::new(format!("t{i}"));
            for name in parents.keys() {
                prop_assert_eq!(recorder.count(&id, name), 1);
            }
        }
        prop_assert_eq!(dispatcher.in_flight(), 0);
    }
}
