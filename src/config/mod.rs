// src/config/mod.rs

//! Configuration loading and validation for the `jobgraph` binary.
//!
//! - TOML-backed data model (`model.rs`).
//! - Loading from disk or a string (`loader.rs`).
//! - Validation of dependencies, durations and acyclicity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate, DEFAULT_CONFIG_FILE};
pub use model::{ConfigFile, EngineSection, EngineSettings, JobConfig, JobSpec, RawConfigFile};
pub use validate::parse_duration;
