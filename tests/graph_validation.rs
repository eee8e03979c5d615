// tests/graph_validation.rs

mod common;

use std::sync::Arc;

use common::{Recorder, TestResult};
use jobgraph::dag::{job, parallel, serial, Job, JobGraph};
use jobgraph::errors::GraphError;

fn builder_with(names: &[&str]) -> jobgraph::dag::GraphBuilder<String> {
    let recorder = Recorder::new();
    let mut builder = JobGraph::builder();
    for name in names {
        builder = builder.job(*name, recorder.job());
    }
    builder
}

#[test]
fn empty_graph_is_rejected() {
    let err = JobGraph::<String>::builder().build().unwrap_err();
    assert_eq!(err, GraphError::Empty);
}

#[test]
fn duplicate_job_name_is_rejected() {
    let err = builder_with(&["A", "B", "A"]).build().unwrap_err();
    assert_eq!(err, GraphError::DuplicateJob("A".to_string()));
}

#[test]
fn edge_to_unknown_job_is_rejected() {
    let err = builder_with(&["A"]).edge("A", "Z").build().unwrap_err();
    assert_eq!(
        err,
        GraphError::UnknownNode {
            from: "A".to_string(),
            to: "Z".to_string(),
            missing: "Z".to_string(),
        }
    );
}

#[test]
fn graph_without_heads_is_rejected() {
    let err = builder_with(&["A", "B"])
        .edge("A", "B")
        .edge("B", "A")
        .build()
        .unwrap_err();
    assert_eq!(err, GraphError::NoHeads);
}

#[test]
fn cycle_reachable_only_through_itself_is_unreachable() {
    // A is a head; B <-> C form a cycle nobody feeds into.
    let err = builder_with(&["A", "B", "C"])
        .edge("B", "C")
        .edge("C", "B")
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::Unreachable(vec!["B".to_string(), "C".to_string()])
    );
}

#[test]
fn cycle_below_a_head_is_rejected() {
    let err = builder_with(&["A", "B", "C"])
        .edge("A", "B")
        .edge("B", "C")
        .edge("C", "B")
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::Cycle(ref node) if node == "B" || node == "C"));
    assert!(err.to_string().contains("cycle detected"));
}

#[test]
fn build_from_node_and_edge_lists() -> TestResult {
    let recorder = Recorder::new();
    let nodes: Vec<(String, Arc<dyn Job<String>>)> = ["A", "B", "C"]
        .iter()
        .map(|n| (n.to_string(), Arc::new(recorder.job()) as Arc<dyn Job<String>>))
        .collect();
    let edges = vec![
        ("A".to_string(), "B".to_string()),
        ("A".to_string(), "C".to_string()),
    ];

    let graph = JobGraph::build(nodes, edges)?;

    assert_eq!(graph.len(), 3);
    assert_eq!(graph.heads(), ["A".to_string()]);
    assert_eq!(graph.tails(), ["B".to_string(), "C".to_string()]);
    assert!(graph.children_of("B").is_empty());
    assert_eq!(graph.parents_of("C"), ["A".to_string()]);
    Ok(())
}

#[test]
fn several_heads_are_allowed() -> TestResult {
    let graph = builder_with(&["A", "B", "C"])
        .edge("A", "C")
        .edge("B", "C")
        .build()?;

    assert_eq!(graph.heads(), ["A".to_string(), "B".to_string()]);
    assert_eq!(graph.tails(), ["C".to_string()]);
    Ok(())
}

#[test]
fn flow_dsl_matches_explicit_edges() -> TestResult {
    let recorder = Recorder::new();
    let flow = serial([
        job("fetch", recorder.job()),
        parallel([job("parse", recorder.job()), job("index", recorder.job())]),
        job("store", recorder.job()),
    ]);
    let graph = flow.build()?;

    assert_eq!(graph.heads(), ["fetch".to_string()]);
    assert_eq!(
        graph.parents_of("store"),
        ["index".to_string(), "parse".to_string()]
    );
    assert_eq!(graph.tails(), ["store".to_string()]);

    let order = graph.topological_order();
    let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert!(pos("fetch") < pos("parse"));
    assert!(pos("parse") < pos("store"));
    assert!(pos("index") < pos("store"));
    Ok(())
}
