#![allow(dead_code)]

use std::error::Error;

pub use jobgraph_test_utils::builders;
pub use jobgraph_test_utils::{init_tracing, with_timeout, Call, Recorder, RecordingJob};

pub type TestResult = Result<(), Box<dyn Error>>;
