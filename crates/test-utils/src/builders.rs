#![allow(dead_code)]

use std::collections::BTreeMap;

use jobgraph::config::{ConfigFile, EngineSection, JobConfig, RawConfigFile};
use jobgraph::dag::JobGraph;
use jobgraph::types::TailPolicy;

use crate::recording::Recorder;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: EngineSection::default(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.config.job.insert(name.to_string(), job);
        self
    }

    pub fn tail_policy(mut self, policy: TailPolicy) -> Self {
        self.config.config.tail_policy = policy;
        self
    }

    pub fn task_timeout(mut self, timeout: &str) -> Self {
        self.config.config.task_timeout = Some(timeout.to_string());
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.config.max_concurrent_jobs = Some(n);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            job: JobConfig {
                cmd: cmd.to_string(),
                after: vec![],
                timeout: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.job.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

/// Linear graph `names[0] -> names[1] -> ...` of recording jobs.
pub fn chain(recorder: &Recorder, names: &[&str]) -> JobGraph<String> {
    let mut builder = JobGraph::builder();
    for name in names {
        builder = builder.job(*name, recorder.job());
    }
    for pair in names.windows(2) {
        builder = builder.edge(pair[0], pair[1]);
    }
    builder.build().expect("chain graph is valid")
}

/// `A -> {B, C} -> D` of recording jobs.
pub fn diamond(recorder: &Recorder) -> JobGraph<String> {
    JobGraph::builder()
        .job("A", recorder.job())
        .job("B", recorder.job())
        .job("C", recorder.job())
        .job("D", recorder.job())
        .edge("A", "B")
        .edge("A", "C")
        .edge("B", "D")
        .edge("C", "D")
        .build()
        .expect("diamond graph is valid")
}
