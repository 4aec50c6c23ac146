//! Task executor seam.

use crate::core::TaskItem;
use crate::errors::TaskError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;

/// Runs one task item to completion.
///
/// Implementations wrap the batch runtime that actually executes the job.
/// A returned [`TaskError::ConcurrencyExceeded`] is retried by the fan-out
/// runner; every other error is recorded as the item's failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes the item and returns its output.
    async fn execute(&self, item: &TaskItem) -> Result<serde_json::Value, TaskError>;
}

/// An async function-based executor.
pub struct FnExecutor<F, Fut>
where
    F: Fn(TaskItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send,
{
    name: String,
    func: F,
}

impl<F, Fut> FnExecutor<F, Fut>
where
    F: Fn(TaskItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send,
{
    /// Creates a new function-based executor.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F, Fut> Debug for FnExecutor<F, Fut>
where
    F: Fn(TaskItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F, Fut>
where
    F: Fn(TaskItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, TaskError>> + Send,
{
    async fn execute(&self, item: &TaskItem) -> Result<serde_json::Value, TaskError> {
        (self.func)(item.clone()).await
    }
}
