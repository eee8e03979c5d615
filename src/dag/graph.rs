// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::job::Job;
use crate::engine::NodeName;
use crate::errors::GraphError;
use crate::types::TailPolicy;

/// A job plus its position in the graph.
pub struct JobNode<V> {
    name: NodeName,
    job: Arc<dyn Job<V>>,
    /// Direct dependencies: jobs whose outputs this one consumes.
    parents: Vec<NodeName>,
    /// Direct dependents: jobs that consume this one's output.
    children: Vec<NodeName>,
    timeout: Option<Duration>,
}

impl<V> JobNode<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job(&self) -> &Arc<dyn Job<V>> {
        &self.job
    }

    pub fn parents(&self) -> &[NodeName] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeName] {
        &self.children
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_head(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_tail(&self) -> bool {
        self.children.is_empty()
    }
}

impl<V> fmt::Debug for JobNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobNode")
            .field("name", &self.name)
            .field("parents", &self.parents)
            .field("children", &self.children)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Immutable DAG of jobs, built once and shared by every task.
///
/// Nothing in here changes after [`GraphBuilder::build`] returns, so the
/// graph is shared behind an `Arc` without any locking. All per-task state
/// lives in [`crate::engine::TaskContext`].
pub struct JobGraph<V> {
    nodes: BTreeMap<NodeName, JobNode<V>>,
    heads: Vec<NodeName>,
    tails: Vec<NodeName>,
    order: Vec<NodeName>,
    tail_policy: TailPolicy,
}

impl<V> JobGraph<V> {
    /// Build and validate a graph from job definitions and `(parent, child)`
    /// edges.
    pub fn build<N, E>(nodes: N, edges: E) -> Result<Self, GraphError>
    where
        N: IntoIterator<Item = (NodeName, Arc<dyn Job<V>>)>,
        E: IntoIterator<Item = (NodeName, NodeName)>,
    {
        let mut builder = GraphBuilder::new();
        for (name, job) in nodes {
            builder = builder.job_arc(name, job, None);
        }
        for (from, to) in edges {
            builder = builder.edge(from, to);
        }
        builder.build()
    }

    pub fn builder() -> GraphBuilder<V> {
        GraphBuilder::new()
    }

    /// Jobs with no parents, in name order.
    pub fn heads(&self) -> &[NodeName] {
        &self.heads
    }

    /// Jobs with no children, in name order.
    pub fn tails(&self) -> &[NodeName] {
        &self.tails
    }

    pub fn parents_of(&self, name: &str) -> &[NodeName] {
        self.nodes
            .get(name)
            .map(|n| n.parents.as_slice())
            .unwrap_or(&[])
    }

    pub fn children_of(&self, name: &str) -> &[NodeName] {
        self.nodes
            .get(name)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn node(&self, name: &str) -> Option<&JobNode<V>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn is_tail(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.is_tail())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &JobNode<V>> {
        self.nodes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// A topological order of all jobs (parents before children).
    pub fn topological_order(&self) -> &[NodeName] {
        &self.order
    }

    pub fn tail_policy(&self) -> TailPolicy {
        self.tail_policy
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<V> fmt::Debug for JobGraph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobGraph")
            .field("nodes", &self.nodes.values().collect::<Vec<_>>())
            .field("heads", &self.heads)
            .field("tails", &self.tails)
            .field("tail_policy", &self.tail_policy)
            .finish()
    }
}

/// Incremental declaration of a [`JobGraph`].
pub struct GraphBuilder<V> {
    jobs: Vec<(NodeName, Arc<dyn Job<V>>, Option<Duration>)>,
    edges: Vec<(NodeName, NodeName)>,
    tail_policy: TailPolicy,
}

impl<V> Default for GraphBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> GraphBuilder<V> {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            edges: Vec::new(),
            tail_policy: TailPolicy::default(),
        }
    }

    pub fn job(self, name: impl Into<NodeName>, job: impl Job<V> + 'static) -> Self {
        self.job_arc(name, Arc::new(job), None)
    }

    pub fn job_with_timeout(
        self,
        name: impl Into<NodeName>,
        job: impl Job<V> + 'static,
        timeout: Duration,
    ) -> Self {
        self.job_arc(name, Arc::new(job), Some(timeout))
    }

    /// Register an already shared job, e.g. one instance under several names.
    pub fn job_arc(
        mut self,
        name: impl Into<NodeName>,
        job: Arc<dyn Job<V>>,
        timeout: Option<Duration>,
    ) -> Self {
        self.jobs.push((name.into(), job, timeout));
        self
    }

    /// Declare that `to` consumes the output of `from`.
    pub fn edge(mut self, from: impl Into<NodeName>, to: impl Into<NodeName>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn tail_policy(mut self, policy: TailPolicy) -> Self {
        self.tail_policy = policy;
        self
    }

    pub(crate) fn push_job(&mut self, name: NodeName, job: Arc<dyn Job<V>>) {
        self.jobs.push((name, job, None));
    }

    pub(crate) fn push_edge(&mut self, from: NodeName, to: NodeName) {
        self.edges.push((from, to));
    }

    pub fn build(self) -> Result<JobGraph<V>, GraphError> {
        if self.jobs.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut parents: BTreeMap<NodeName, BTreeSet<NodeName>> = BTreeMap::new();
        let mut children: BTreeMap<NodeName, BTreeSet<NodeName>> = BTreeMap::new();
        let mut defs: BTreeMap<NodeName, (Arc<dyn Job<V>>, Option<Duration>)> = BTreeMap::new();

        for (name, job, timeout) in self.jobs {
            if defs.contains_key(&name) {
                return Err(GraphError::DuplicateJob(name));
            }
            parents.insert(name.clone(), BTreeSet::new());
            children.insert(name.clone(), BTreeSet::new());
            defs.insert(name, (job, timeout));
        }

        for (from, to) in &self.edges {
            for end in [from, to] {
                if !defs.contains_key(end) {
                    return Err(GraphError::UnknownNode {
                        from: from.clone(),
                        to: to.clone(),
                        missing: end.clone(),
                    });
                }
            }
            children.entry(from.clone()).or_default().insert(to.clone());
            parents.entry(to.clone()).or_default().insert(from.clone());
        }

        let heads: Vec<NodeName> = parents
            .iter()
            .filter(|(_, p)| p.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        if heads.is_empty() {
            return Err(GraphError::NoHeads);
        }

        let unreachable = unreachable_from(&heads, &children);
        if !unreachable.is_empty() {
            return Err(GraphError::Unreachable(unreachable));
        }

        let edge_refs: Vec<(&str, &str)> = self
            .edges
            .iter()
            .map(|(f, t)| (f.as_str(), t.as_str()))
            .collect();
        let order = topological_order(defs.keys().map(|s| s.as_str()), &edge_refs)?;

        let tails: Vec<NodeName> = children
            .iter()
            .filter(|(_, c)| c.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        let mut nodes = BTreeMap::new();
        for (name, (job, timeout)) in defs {
            let node = JobNode {
                parents: parents.remove(&name).unwrap_or_default().into_iter().collect(),
                children: children.remove(&name).unwrap_or_default().into_iter().collect(),
                name: name.clone(),
                job,
                timeout,
            };
            nodes.insert(name, node);
        }

        debug!(
            jobs = nodes.len(),
            ?heads,
            ?tails,
            policy = ?self.tail_policy,
            "job graph validated"
        );

        Ok(JobGraph {
            nodes,
            heads,
            tails,
            order,
            tail_policy: self.tail_policy,
        })
    }
}

/// Names not reachable from any head by following child edges.
fn unreachable_from(
    heads: &[NodeName],
    children: &BTreeMap<NodeName, BTreeSet<NodeName>>,
) -> Vec<NodeName> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = heads.iter().map(|h| h.as_str()).collect();

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(next) = children.get(name) {
            queue.extend(next.iter().map(|c| c.as_str()));
        }
    }

    children
        .keys()
        .filter(|name| !seen.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Topologically sort `names` under `(parent, child)` edges.
///
/// Shared by graph construction and config validation.
pub(crate) fn topological_order<'a>(
    names: impl IntoIterator<Item = &'a str>,
    edges: &[(&'a str, &'a str)],
) -> Result<Vec<NodeName>, GraphError> {
    // Edge direction: parent -> child.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in names {
        graph.add_node(name);
    }
    for &(from, to) in edges {
        graph.add_edge(from, to, ());
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|s| s.to_string()).collect()),
        Err(cycle) => Err(GraphError::Cycle(cycle.node_id().to_string())),
    }
}
