//! Core domain model types for cdpflow.
//!
//! This module contains the records that flow through a workflow run:
//! - Workflow input and task items
//! - Task results and their aggregate
//! - Classified outcomes and notification messages
//! - Status, route and terminal state enums

mod outcome;
mod result;
mod status;
mod task;

pub use outcome::{ExecutionOutcome, MessageAttribute, MessageAttributes, NotificationMessage};
pub use result::{TaskResult, TaskResultSet};
pub use status::{Route, TaskStatus, TerminalState};
pub use task::{TaskItem, WorkflowInput};
