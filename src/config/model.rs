// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::DispatchOptions;
use crate::types::TailPolicy;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// tail_policy = "all"
/// task_timeout = "30s"
/// max_concurrent_jobs = 8
///
/// [job.A]
/// cmd = "tr a-z A-Z"
///
/// [job.B]
/// cmd = "rev"
/// after = ["A"]
/// timeout = "5s"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: EngineSection,

    /// All jobs from `[job.<name>]`, keyed by job name.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// `"all"` (default) or `"first"`.
    #[serde(default)]
    pub tail_policy: TailPolicy,

    /// Per-task deadline, e.g. `"30s"`.
    #[serde(default)]
    pub task_timeout: Option<String>,

    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,

    /// Capacity of the runtime's event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tail_policy: TailPolicy::default(),
            task_timeout: None,
            max_concurrent_jobs: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Shell command run once per task that reaches this job.
    pub cmd: String,

    /// Jobs whose outputs this one consumes.
    #[serde(default)]
    pub after: Vec<String>,

    /// Per-invocation timeout, e.g. `"5s"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub tail_policy: TailPolicy,
    pub task_timeout: Option<Duration>,
    pub max_concurrent_jobs: Option<usize>,
    pub channel_capacity: usize,
}

impl EngineSettings {
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            task_timeout: self.task_timeout,
            max_concurrent_jobs: self.max_concurrent_jobs,
        }
    }
}

/// Validated job definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub cmd: String,
    pub after: Vec<String>,
    pub timeout: Option<Duration>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, so every
/// instance references known jobs only and describes an acyclic graph.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    settings: EngineSettings,
    jobs: BTreeMap<String, JobSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(settings: EngineSettings, jobs: BTreeMap<String, JobSpec>) -> Self {
        Self { settings, jobs }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &BTreeMap<String, JobSpec> {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name)
    }
}
