// src/exec/mod.rs

//! Process execution layer.
//!
//! [`command`] provides [`CommandJob`], a [`crate::dag::Job`] that runs a
//! shell command per invocation, and [`build_command_graph`], which turns a
//! validated config into a job graph of such jobs.

pub mod command;

pub use command::{build_command_graph, CommandJob};
