// src/dag/flow.rs

//! Serial / parallel composition of jobs.
//!
//! ```no_run
//! use jobgraph::dag::{job, job_fn, JobInput};
//!
//! let step = || job_fn(|i: JobInput<String>| async move { Ok(i.into_values().concat()) });
//!
//! // A feeds both B and C, which both feed D.
//! let flow = job("A", step()) >> (job("B", step()) | job("C", step())) >> job("D", step());
//! let graph = flow.build().unwrap();
//! assert_eq!(graph.parents_of("D").len(), 2);
//! ```

use std::ops::{BitOr, Shr};
use std::sync::Arc;

use crate::dag::graph::{GraphBuilder, JobGraph};
use crate::dag::job::Job;
use crate::engine::NodeName;
use crate::errors::GraphError;
use crate::types::TailPolicy;

/// A composable fragment of a job graph.
pub enum Flow<V> {
    Job {
        name: NodeName,
        job: Arc<dyn Job<V>>,
    },
    /// Each element consumes the outputs of the previous one.
    Serial(Vec<Flow<V>>),
    /// Elements run side by side.
    Parallel(Vec<Flow<V>>),
}

pub fn job<V>(name: impl Into<NodeName>, job: impl Job<V> + 'static) -> Flow<V> {
    Flow::Job {
        name: name.into(),
        job: Arc::new(job),
    }
}

pub fn serial<V>(flows: impl IntoIterator<Item = Flow<V>>) -> Flow<V> {
    Flow::Serial(flows.into_iter().collect())
}

pub fn parallel<V>(flows: impl IntoIterator<Item = Flow<V>>) -> Flow<V> {
    Flow::Parallel(flows.into_iter().collect())
}

impl<V> Flow<V> {
    /// Lower the flow into a builder, so callers can still adjust it.
    pub fn into_builder(self) -> GraphBuilder<V> {
        let mut builder = GraphBuilder::new();
        self.lower(&mut builder);
        builder
    }

    pub fn build(self) -> Result<JobGraph<V>, GraphError> {
        self.into_builder().build()
    }

    pub fn build_with_policy(self, policy: TailPolicy) -> Result<JobGraph<V>, GraphError> {
        self.into_builder().tail_policy(policy).build()
    }

    /// Adds this flow's jobs and edges; returns its (heads, tails).
    fn lower(self, builder: &mut GraphBuilder<V>) -> (Vec<NodeName>, Vec<NodeName>) {
        match self {
            Flow::Job { name, job } => {
                builder.push_job(name.clone(), job);
                (vec![name.clone()], vec![name])
            }
            Flow::Serial(parts) => {
                let mut heads: Option<Vec<NodeName>> = None;
                let mut tails: Vec<NodeName> = Vec::new();

                for part in parts {
                    let (part_heads, part_tails) = part.lower(builder);
                    if part_heads.is_empty() {
                        continue;
                    }
                    for from in &tails {
                        for to in &part_heads {
                            builder.push_edge(from.clone(), to.clone());
                        }
                    }
                    heads.get_or_insert(part_heads);
                    tails = part_tails;
                }

                (heads.unwrap_or_default(), tails)
            }
            Flow::Parallel(parts) => {
                let mut heads = Vec::new();
                let mut tails = Vec::new();
                for part in parts {
                    let (h, t) = part.lower(builder);
                    heads.extend(h);
                    tails.extend(t);
                }
                (heads, tails)
            }
        }
    }
}

impl<V> Shr for Flow<V> {
    type Output = Flow<V>;

    fn shr(self, rhs: Flow<V>) -> Flow<V> {
        match self {
            Flow::Serial(mut parts) => {
                parts.push(rhs);
                Flow::Serial(parts)
            }
            other => Flow::Serial(vec![other, rhs]),
        }
    }
}

impl<V> BitOr for Flow<V> {
    type Output = Flow<V>;

    fn bitor(self, rhs: Flow<V>) -> Flow<V> {
        match self {
            Flow::Parallel(mut parts) => {
                parts.push(rhs);
                Flow::Parallel(parts)
            }
            other => Flow::Parallel(vec![other, rhs]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::job::{job_fn, JobInput};

    fn step(name: &str) -> Flow<u32> {
        job(name, job_fn(|_: JobInput<u32>| async { Ok(1) }))
    }

    #[test]
    fn serial_chain_links_neighbours() {
        let graph = serial([step("A"), step("B"), step("C")]).build().unwrap();

        assert_eq!(graph.heads(), ["A".to_string()]);
        assert_eq!(graph.parents_of("C"), ["B".to_string()]);
        assert_eq!(graph.tails(), ["C".to_string()]);
    }

    #[test]
    fn parallel_then_join_builds_diamond() {
        let graph = (step("A") >> (step("B") | step("C")) >> step("D"))
            .build()
            .unwrap();

        assert_eq!(graph.children_of("A"), ["B".to_string(), "C".to_string()]);
        assert_eq!(graph.parents_of("D"), ["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn parallel_branches_keep_their_own_tails() {
        let graph = (step("A") >> (step("B") | step("C")))
            .build_with_policy(TailPolicy::First)
            .unwrap();

        assert_eq!(graph.tails(), ["B".to_string(), "C".to_string()]);
        assert_eq!(graph.tail_policy(), TailPolicy::First);
    }

    #[test]
    fn reused_name_is_rejected() {
        let err = (step("A") >> step("A")).build().unwrap_err();
        assert_eq!(err, GraphError::DuplicateJob("A".to_string()));
    }

    #[test]
    fn empty_flow_is_rejected() {
        let err = serial(Vec::<Flow<u32>>::new()).build().unwrap_err();
        assert_eq!(err, GraphError::Empty);
    }
}
