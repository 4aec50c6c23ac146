//! Workflow envelope.
//!
//! This module provides:
//! - The [`ChildWorkflow`] seam and the jobs fan-out workflow
//! - The envelope state machine
//! - [`WorkflowEnvelope`], which runs a child, classifies its result and
//!   publishes the matching notification

mod engine;
mod state;
mod workflow;

#[cfg(test)]
mod integration_tests;

pub use engine::{EnvelopeReport, WorkflowEnvelope};
pub use state::{StateEvent, WorkflowState};
#[cfg(test)]
pub use workflow::MockChildWorkflow;
pub use workflow::{ChildWorkflow, ItemFailurePolicy, JobsWorkflow};
