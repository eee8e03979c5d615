// src/lib.rs

//! Concurrent execution of tasks through a DAG of jobs.
//!
//! A [`dag::JobGraph`] is built once and shared. Every submitted
//! [`engine::Task`] gets its own execution context, so many tasks can move
//! through the same graph at the same time without seeing each other's data.
//!
//! ```no_run
//! use jobgraph::dag::{job, job_fn, JobInput};
//! use jobgraph::engine::{Dispatcher, Task};
//!
//! # async fn demo() -> jobgraph::errors::Result<()> {
//! let upper = || job_fn(|i: JobInput<String>| async move { Ok(i.into_values().concat().to_uppercase()) });
//! let graph = (job("A", upper()) >> job("B", upper())).build()?;
//!
//! let dispatcher = Dispatcher::new(graph);
//! let output = dispatcher.run(Task::new("t1", "hi".to_string())).await?;
//! assert_eq!(output.into_single().as_deref(), Some("HI"));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use anyhow::{anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{Dispatcher, PrintSink, Runtime, RuntimeHandle};
use crate::exec::build_command_graph;

/// Name under which the binary registers the configured graph.
const GRAPH_NAME: &str = "main";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph construction
/// - the dispatcher and runtime loop
/// - task intake from `--input` or stdin
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let settings = cfg.settings();
    let graph = build_command_graph(&cfg)?;
    let dispatcher = Dispatcher::with_options(graph, settings.dispatch_options());

    let (handle, event_rx) = RuntimeHandle::channel(settings.channel_capacity);
    let runtime = Runtime::new(event_rx, PrintSink).with_graph(GRAPH_NAME, dispatcher);

    // Ctrl-C → shutdown.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = handle.shutdown().await;
        });
    }

    let (feeder, fed) = spawn_feeder(handle, args.inputs, BufReader::new(tokio::io::stdin()));

    let stats = runtime.run().await?;
    feeder.abort();

    info!(?stats, "all tasks delivered");

    if let Ok(Err(e)) = fed.await {
        return Err(anyhow!(e).context("reading task input failed"));
    }

    if stats.failed > 0 || stats.rejected > 0 {
        bail!(
            "{} task(s) failed and {} were rejected",
            stats.failed,
            stats.rejected
        );
    }
    Ok(())
}

/// Feed tasks to the runtime on a background task.
///
/// Input is always marked completed afterwards, even when reading fails, so
/// the runtime drains and stops. The receiver yields how many tasks were
/// submitted, or the read error; it is resolved before input is closed.
fn spawn_feeder<R>(
    handle: RuntimeHandle<String>,
    inputs: Vec<String>,
    reader: R,
) -> (JoinHandle<()>, oneshot::Receiver<errors::Result<usize>>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (fed_tx, fed_rx) = oneshot::channel();
    let feeder = tokio::spawn(async move {
        let fed = feed_inputs(&handle, inputs, reader).await;
        match &fed {
            Ok(count) => debug!(count, "task input exhausted"),
            Err(e) => error!(error = %e, "reading task input failed; no more tasks will be submitted"),
        }
        let _ = fed_tx.send(fed);
        if let Err(e) = handle.mark_input_completed().await {
            debug!(error = %e, "runtime stopped before input was completed");
        }
    });
    (feeder, fed_rx)
}

/// Submit every `--input`, or every non-empty line of `reader` when there are none.
async fn feed_inputs<R>(
    handle: &RuntimeHandle<String>,
    inputs: Vec<String>,
    reader: R,
) -> errors::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut count = 0;
    if inputs.is_empty() {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            handle.submit_payload(line).await?;
            count += 1;
        }
    } else {
        for input in inputs {
            handle.submit_payload(input).await?;
            count += 1;
        }
    }
    Ok(count)
}

/// Print settings, jobs and a run order without executing anything.
fn print_dry_run(cfg: &ConfigFile) -> anyhow::Result<()> {
    let graph = build_command_graph(cfg)?;
    let settings = cfg.settings();

    println!("jobgraph dry-run");
    println!("  config.tail_policy = {:?}", settings.tail_policy);
    if let Some(timeout) = settings.task_timeout {
        println!("  config.task_timeout = {timeout:?}");
    }
    if let Some(limit) = settings.max_concurrent_jobs {
        println!("  config.max_concurrent_jobs = {limit}");
    }
    println!("  config.channel_capacity = {}", settings.channel_capacity);
    println!();

    println!("jobs ({}):", cfg.jobs().len());
    for (name, job) in cfg.jobs() {
        println!("  - {name}");
        println!("      cmd: {}", job.cmd);
        if !job.after.is_empty() {
            println!("      after: {:?}", job.after);
        }
        if let Some(timeout) = job.timeout {
            println!("      timeout: {timeout:?}");
        }
    }
    println!();

    println!("heads: {:?}", graph.heads());
    println!("tails: {:?}", graph.tails());
    println!("order: {:?}", graph.topological_order());

    debug!("dry-run complete (no execution)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dag::{job, job_fn, JobInput};
    use crate::engine::ChannelSink;
    use crate::errors::JobGraphError;

    fn echo_dispatcher() -> Dispatcher<String> {
        let echo = job_fn(|input: JobInput<String>| async move { Ok(input.into_values().concat()) });
        Dispatcher::new(job("echo", echo).build().unwrap())
    }

    #[tokio::test]
    async fn unreadable_input_still_lets_the_runtime_finish() {
        let (handle, event_rx) = RuntimeHandle::channel(8);
        let (sink, mut results) = ChannelSink::channel(8);
        let runtime = Runtime::new(event_rx, sink).with_graph(GRAPH_NAME, echo_dispatcher());

        // Second line is not valid UTF-8.
        let stdin: &'static [u8] = b"ok\n\xff\xfe\n";
        let (feeder, fed) = spawn_feeder(handle.clone(), Vec::new(), stdin);

        let stats = tokio::time::timeout(Duration::from_secs(5), runtime.run())
            .await
            .expect("runtime should stop once input is closed")
            .unwrap();
        feeder.await.unwrap();

        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.succeeded, 1);
        assert!(matches!(fed.await, Ok(Err(JobGraphError::IoError(_)))));

        let (_, first) = results.recv().await.unwrap();
        assert_eq!(first.unwrap().into_single().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn explicit_inputs_take_precedence_over_the_reader() {
        let (handle, event_rx) = RuntimeHandle::channel(8);
        let (sink, _results) = ChannelSink::channel(8);
        let runtime = Runtime::new(event_rx, sink).with_graph(GRAPH_NAME, echo_dispatcher());

        let stdin: &'static [u8] = b"ignored\n";
        let inputs = vec!["a".to_string(), "b".to_string()];
        let (_feeder, fed) = spawn_feeder(handle, inputs, stdin);

        let stats = tokio::time::timeout(Duration::from_secs(5), runtime.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.submitted, 2);
        assert!(matches!(fed.await, Ok(Ok(2))));
    }
}
