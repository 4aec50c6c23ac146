//! Execution context for envelope invocations.

mod execution;

pub use execution::ExecutionContext;
