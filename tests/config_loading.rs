// tests/config_loading.rs

mod common;

use std::io::Write;
use std::time::Duration;

use common::builders::{ConfigFileBuilder, JobConfigBuilder};
use jobgraph::config::{load_and_validate, ConfigFile};
use jobgraph::errors::{GraphError, JobGraphError};
use jobgraph::exec::build_command_graph;
use jobgraph::types::TailPolicy;
use tempfile::NamedTempFile;

fn load(contents: &str) -> Result<ConfigFile, JobGraphError> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    load_and_validate(file.path())
}

#[test]
fn full_config_is_loaded() {
    let cfg = load(
        r#"
[config]
tail_policy = "first"
task_timeout = "30s"
max_concurrent_jobs = 4
channel_capacity = 8

[job.A]
cmd = "tr a-z A-Z"

[job.B]
cmd = "rev"
after = ["A"]
timeout = "5s"
"#,
    )
    .unwrap();

    let settings = cfg.settings();
    assert_eq!(settings.tail_policy, TailPolicy::First);
    assert_eq!(settings.task_timeout, Some(Duration::from_secs(30)));
    assert_eq!(settings.max_concurrent_jobs, Some(4));
    assert_eq!(settings.channel_capacity, 8);

    let options = settings.dispatch_options();
    assert_eq!(options.task_timeout, Some(Duration::from_secs(30)));
    assert_eq!(options.max_concurrent_jobs, Some(4));

    let b = cfg.job("B").unwrap();
    assert_eq!(b.after, ["A"]);
    assert_eq!(b.timeout, Some(Duration::from_secs(5)));
}

#[test]
fn defaults_apply_without_config_section() {
    let cfg = load(
        r#"
[job.only]
cmd = "cat"
"#,
    )
    .unwrap();

    assert_eq!(cfg.settings().tail_policy, TailPolicy::All);
    assert_eq!(cfg.settings().task_timeout, None);
    assert_eq!(cfg.settings().max_concurrent_jobs, None);
    assert_eq!(cfg.settings().channel_capacity, 64);
}

#[test]
fn dag_cycle_returns_structured_error() {
    let result = load(
        r#"
[job.A]
cmd = "echo A"
after = ["B"]

[job.B]
cmd = "echo B"
after = ["A"]
"#,
    );

    match result {
        Err(JobGraphError::Graph(GraphError::Cycle(node))) => {
            assert!(node == "A" || node == "B");
        }
        Err(e) => panic!("Expected cycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_returns_config_error() {
    let result = load(
        r#"
[job.A]
cmd = "echo A"
after = ["NonExistent"]
"#,
    );

    match result {
        Err(JobGraphError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn self_dependency_returns_config_error() {
    let result = load(
        r#"
[job.A]
cmd = "echo A"
after = ["A"]
"#,
    );

    assert!(matches!(result, Err(JobGraphError::ConfigError(msg)) if msg.contains("itself")));
}

#[test]
fn empty_config_is_rejected() {
    let result = load("[config]\ntail_policy = \"all\"\n");
    assert!(matches!(result, Err(JobGraphError::ConfigError(msg)) if msg.contains("at least one")));
}

#[test]
fn invalid_values_are_rejected() {
    let bad_policy = load(
        r#"
[config]
tail_policy = "sometimes"

[job.A]
cmd = "cat"
"#,
    );
    assert!(matches!(bad_policy, Err(JobGraphError::TomlError(_))));

    let bad_timeout = load(
        r#"
[job.A]
cmd = "cat"
timeout = "5 days"
"#,
    );
    assert!(matches!(bad_timeout, Err(JobGraphError::ConfigError(msg)) if msg.contains("timeout")));

    let zero_capacity = load(
        r#"
[config]
channel_capacity = 0

[job.A]
cmd = "cat"
"#,
    );
    assert!(matches!(zero_capacity, Err(JobGraphError::ConfigError(msg)) if msg.contains("channel_capacity")));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(JobGraphError::IoError(_))));
}

#[test]
fn builder_config_turns_into_a_graph() {
    let cfg = ConfigFileBuilder::new()
        .tail_policy(TailPolicy::First)
        .with_job("fetch", JobConfigBuilder::new("cat").build())
        .with_job("left", JobConfigBuilder::new("rev").after("fetch").build())
        .with_job("right", JobConfigBuilder::new("cat").after("fetch").timeout("1s").build())
        .build();

    let graph = build_command_graph(&cfg).unwrap();
    assert_eq!(graph.heads(), ["fetch".to_string()]);
    assert_eq!(graph.tails(), ["left".to_string(), "right".to_string()]);
    assert_eq!(graph.tail_policy(), TailPolicy::First);
    assert_eq!(
        graph.node("right").and_then(|n| n.timeout()),
        Some(Duration::from_secs(1))
    );
}

#[test]
fn zero_concurrency_limit_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .max_concurrent_jobs(0)
        .with_job("A", JobConfigBuilder::new("cat").build())
        .raw();

    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(err.to_string().contains("max_concurrent_jobs"));
}
