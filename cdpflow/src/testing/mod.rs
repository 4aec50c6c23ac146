//! Testing utilities for cdpflow workflows.
//!
//! This module provides:
//! - Scripted task executors and a concurrency probe
//! - Static, failing and panicking child workflows
//! - An envelope harness with in-memory channel and event sink
//! - Assertions over envelope reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_outcome, assert_published, assert_silent};
pub use fixtures::TestHarness;
pub use mocks::{
    ConcurrencyProbe, FailingWorkflow, PanickingWorkflow, ScriptedExecutor, StaticParser,
    StaticWorkflow,
};
