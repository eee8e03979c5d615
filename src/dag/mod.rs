// src/dag/mod.rs

//! Job graph representation.
//!
//! - [`job`] defines the `Job` capability and the input handed to it.
//! - [`graph`] holds the immutable, validated DAG shared by all tasks.
//! - [`flow`] offers serial / parallel composition on top of the builder.

pub mod flow;
pub mod graph;
pub mod job;

pub use flow::{job, parallel, serial, Flow};
pub use graph::{GraphBuilder, JobGraph, JobNode};
pub use job::{job_fn, FnJob, Invocation, Job, JobFuture, JobInput, JobValue};
