//! Parallel task fan-out.
//!
//! This module provides:
//! - The [`TaskExecutor`] seam to the batch runtime
//! - An injectable [`BackoffPolicy`] for concurrency exhaustion
//! - The bounded-concurrency [`FanoutRunner`]

mod backoff;
mod executor;
mod runner;

pub use backoff::{
    should_retry, with_retry, BackoffPolicy, JitterStrategy, RetryDecision, RetryState,
};
#[cfg(test)]
pub use executor::MockTaskExecutor;
pub use executor::{FnExecutor, TaskExecutor};
pub use runner::{FanoutRunner, DEFAULT_MAX_CONCURRENCY};
