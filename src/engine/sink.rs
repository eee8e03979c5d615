// src/engine/sink.rs

//! Where the runtime delivers finished tasks.

use std::fmt::Display;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{TailOutput, TaskId};
use crate::errors::JobGraphError;

/// Boxed future returned by [`ResultSink::deliver`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = crate::errors::Result<()>> + Send + 'a>>;

/// Consumer of task results, called once per task in completion order.
///
/// Returning an error stops the runtime.
pub trait ResultSink<V>: Send {
    fn deliver(
        &mut self,
        task_id: TaskId,
        result: crate::errors::Result<TailOutput<V>>,
    ) -> SinkFuture<'_>;
}

/// Forwards every result into an mpsc channel.
pub struct ChannelSink<V> {
    tx: mpsc::Sender<(TaskId, crate::errors::Result<TailOutput<V>>)>,
}

impl<V> ChannelSink<V> {
    pub fn new(tx: mpsc::Sender<(TaskId, crate::errors::Result<TailOutput<V>>)>) -> Self {
        Self { tx }
    }

    pub fn channel(
        capacity: usize,
    ) -> (Self, mpsc::Receiver<(TaskId, crate::errors::Result<TailOutput<V>>)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl<V: Send + 'static> ResultSink<V> for ChannelSink<V> {
    fn deliver(
        &mut self,
        task_id: TaskId,
        result: crate::errors::Result<TailOutput<V>>,
    ) -> SinkFuture<'_> {
        Box::pin(async move {
            self.tx
                .send((task_id, result))
                .await
                .map_err(|_| JobGraphError::SinkClosed)
        })
    }
}

/// Calls a closure for every result.
pub struct FnSink<F> {
    f: F,
}

impl<F> FnSink<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<V, F> ResultSink<V> for FnSink<F>
where
    F: FnMut(TaskId, crate::errors::Result<TailOutput<V>>) + Send,
{
    fn deliver(
        &mut self,
        task_id: TaskId,
        result: crate::errors::Result<TailOutput<V>>,
    ) -> SinkFuture<'_> {
        (self.f)(task_id, result);
        Box::pin(async { Ok(()) })
    }
}

/// Writes results to stdout as `<task_id>\t<output>`.
///
/// A multi-tail result is printed one tail per line as
/// `<task_id>\t<tail>\t<output>`. Failures go to the log, not stdout.
#[derive(Debug, Default)]
pub struct PrintSink;

impl<V: Display + Send + 'static> ResultSink<V> for PrintSink {
    fn deliver(
        &mut self,
        task_id: TaskId,
        result: crate::errors::Result<TailOutput<V>>,
    ) -> SinkFuture<'_> {
        let lines = match result {
            Ok(TailOutput::Single { value, .. }) => vec![format!("{task_id}\t{value}")],
            Ok(TailOutput::Aggregate(outputs)) => outputs
                .into_iter()
                .map(|(tail, value)| format!("{task_id}\t{tail}\t{value}"))
                .collect(),
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "task failed");
                Vec::new()
            }
        };

        let written = write_lines(&lines);
        Box::pin(async move { written })
    }
}

fn write_lines(lines: &[String]) -> crate::errors::Result<()> {
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}")?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_results() {
        let (mut sink, mut rx) = ChannelSink::<u32>::channel(4);

        let output = TailOutput::Single {
            node: "D".to_string(),
            value: 7,
        };
        sink.deliver(TaskId::from("t1"), Ok(output.clone()))
            .await
            .unwrap();

        let (task_id, result) = rx.recv().await.unwrap();
        assert_eq!(task_id, TaskId::from("t1"));
        assert_eq!(result.unwrap(), output);
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (mut sink, rx) = ChannelSink::<u32>::channel(1);
        drop(rx);

        let err = sink
            .deliver(TaskId::from("t1"), Err(JobGraphError::RuntimeClosed))
            .await
            .unwrap_err();
        assert!(matches!(err, JobGraphError::SinkClosed));
    }

    #[tokio::test]
    async fn fn_sink_calls_closure() {
        let mut seen = Vec::new();
        {
            let mut sink = FnSink::new(|id: TaskId, result: crate::errors::Result<TailOutput<u32>>| {
                seen.push((id, result.is_ok()));
            });
            ResultSink::<u32>::deliver(&mut sink, TaskId::from("a"), Err(JobGraphError::RuntimeClosed))
                .await
                .unwrap();
        }
        assert_eq!(seen, vec![(TaskId::from("a"), false)]);
    }
}
