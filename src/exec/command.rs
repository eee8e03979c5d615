// src/exec/command.rs

//! Shell-command jobs.
//!
//! Each invocation spawns the job's command through the platform shell,
//! feeds the job input on stdin and returns trimmed stdout. The task id,
//! job name and parent names are exported as `JOBGRAPH_TASK_ID`,
//! `JOBGRAPH_NODE` and `JOBGRAPH_PARENTS`.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::dag::{Invocation, Job, JobFuture, JobGraph, JobInput};
use crate::errors::Result;

/// A job that runs one shell command per invocation.
#[derive(Debug, Clone)]
pub struct CommandJob {
    cmd: String,
}

impl CommandJob {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    async fn execute(&self, call: &Invocation, input: JobInput<String>) -> anyhow::Result<String> {
        let parents = input
            .parents()
            .map(|p| p.keys().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        let mut stdin_data = input.into_values().join("\n");
        if !stdin_data.is_empty() && !stdin_data.ends_with('\n') {
            stdin_data.push('\n');
        }

        info!(
            task_id = %call.task_id,
            node = %call.node,
            cmd = %self.cmd,
            "starting job process"
        );

        let mut cmd = shell_command(&self.cmd);
        cmd.env("JOBGRAPH_TASK_ID", call.task_id.as_str())
            .env("JOBGRAPH_NODE", &call.node)
            .env("JOBGRAPH_PARENTS", &parents)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for job '{}'", call.node))?;

        // Write stdin alongside reading stdout so neither side can block the other.
        let stdin = child.stdin.take();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(stdin_data.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for process of job '{}'", call.node))?;

        match writer.await {
            Ok(Ok(())) => {}
            // Commands that ignore stdin close the pipe early.
            Ok(Err(err)) => debug!(node = %call.node, error = %err, "stdin not fully consumed"),
            Err(err) => debug!(node = %call.node, error = %err, "stdin writer aborted"),
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(task_id = %call.task_id, node = %call.node, "stderr: {}", line);
        }

        let code = output.status.code().unwrap_or(-1);
        info!(
            task_id = %call.task_id,
            node = %call.node,
            exit_code = code,
            success = output.status.success(),
            "job process exited"
        );

        if !output.status.success() {
            bail!(
                "command `{}` exited with code {}: {}",
                self.cmd,
                code,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Job<String> for CommandJob {
    fn run<'a>(&'a self, call: &'a Invocation, input: JobInput<String>) -> JobFuture<'a, String> {
        Box::pin(self.execute(call, input))
    }
}

fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

/// Build the job graph described by a validated config, one [`CommandJob`]
/// per `[job.<name>]`.
pub fn build_command_graph(config: &ConfigFile) -> Result<JobGraph<String>> {
    let mut builder = JobGraph::builder().tail_policy(config.settings().tail_policy);

    for (name, spec) in config.jobs() {
        builder = builder.job_arc(
            name.clone(),
            Arc::new(CommandJob::new(spec.cmd.clone())),
            spec.timeout,
        );
        for dep in &spec.after {
            builder = builder.edge(dep.clone(), name.clone());
        }
    }

    Ok(builder.build()?)
}
