//! Bounded-concurrency fan-out runner.
//!
//! Every item runs in its own task behind a semaphore permit. A failing
//! item only affects its own [`TaskResult`]; the runner always returns one
//! result per submitted item, in submission order.

use super::{with_retry, BackoffPolicy, TaskExecutor};
use crate::core::{TaskItem, TaskResult, TaskResultSet};
use crate::errors::TaskError;
use crate::events::{EventSink, NoOpEventSink};
use crate::utils::elapsed_ms;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Default number of items running at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Runs a homogeneous list of task items with a concurrency cap.
#[derive(Clone)]
pub struct FanoutRunner {
    max_concurrency: usize,
    backoff: BackoffPolicy,
    item_timeout: Option<Duration>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for FanoutRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutRunner")
            .field("max_concurrency", &self.max_concurrency)
            .field("backoff", &self.backoff)
            .field("item_timeout", &self.item_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for FanoutRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl FanoutRunner {
    /// Creates a runner. A cap of zero is raised to one.
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            backoff: BackoffPolicy::default(),
            item_timeout: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the backoff policy for concurrency exhaustion.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets a per-attempt time budget.
    #[must_use]
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the concurrency cap.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns the backoff policy.
    #[must_use]
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Runs every item and collects one result per item.
    pub async fn run_all(
        &self,
        executor: Arc<dyn TaskExecutor>,
        items: Vec<TaskItem>,
    ) -> TaskResultSet {
        let start = Instant::now();
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        tracing::info!(
            items = total,
            max_concurrency = self.max_concurrency,
            "Starting fan-out"
        );

        let mut active = FuturesUnordered::new();
        let mut names = Vec::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            names.push(item.task_name.clone());
            let handle = tokio::spawn(
                run_item(
                    item.clone(),
                    executor.clone(),
                    semaphore.clone(),
                    self.backoff.clone(),
                    self.item_timeout,
                    self.events.clone(),
                )
                .instrument(tracing::info_span!("task", task = %item.task_name)),
            );
            active.push(async move { (index, handle.await) });
        }

        let mut slots: Vec<Option<TaskResult>> = vec![None; total];
        while let Some((index, joined)) = active.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        join_error.to_string()
                    };
                    let err = TaskError::Panicked {
                        task: names[index].clone(),
                        message,
                    };
                    tracing::error!(task = %names[index], error = %err, "Task aborted");
                    self.events.try_emit(
                        "task.failed",
                        Some(serde_json::json!({
                            "task": &names[index],
                            "error": err.to_string(),
                        })),
                    );
                    TaskResult::failure(names[index].clone(), err.to_string(), err.to_payload())
                }
            };
            slots[index] = Some(result);
        }

        let results: Vec<TaskResult> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| {
                    TaskResult::failure(name, "task produced no result", serde_json::Value::Null)
                })
            })
            .collect();

        let set = TaskResultSet::new(results, elapsed_ms(start));
        tracing::info!(
            total = set.len(),
            succeeded = set.succeeded(),
            failed = set.failed(),
            duration_ms = set.duration_ms,
            "Fan-out completed"
        );
        self.events.try_emit(
            "fanout.completed",
            Some(serde_json::json!({
                "total": set.len(),
                "succeeded": set.succeeded(),
                "failed": set.failed(),
                "duration_ms": set.duration_ms,
            })),
        );
        set
    }
}

async fn run_item(
    item: TaskItem,
    executor: Arc<dyn TaskExecutor>,
    semaphore: Arc<Semaphore>,
    backoff: BackoffPolicy,
    item_timeout: Option<Duration>,
    events: Arc<dyn EventSink>,
) -> TaskResult {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return TaskResult::failure(
            item.task_name.clone(),
            "fan-out semaphore closed",
            serde_json::Value::Null,
        );
    };

    let start = Instant::now();
    events.try_emit(
        "task.started",
        Some(serde_json::json!({"task": &item.task_name, "module": &item.module})),
    );

    let mut invocation = 0u32;
    let (outcome, attempts) = with_retry(
        &backoff,
        &item.task_name,
        TaskError::is_concurrency_exhausted,
        || {
            invocation += 1;
            if invocation > 1 {
                events.try_emit(
                    "task.retrying",
                    Some(serde_json::json!({"task": &item.task_name, "attempt": invocation})),
                );
            }
            execute_once(executor.as_ref(), &item, item_timeout)
        },
    )
    .await;

    let duration_ms = elapsed_ms(start);
    match outcome {
        Ok(output) => {
            tracing::debug!(attempts, duration_ms, "Task completed");
            events.try_emit(
                "task.completed",
                Some(serde_json::json!({
                    "task": &item.task_name,
                    "attempts": attempts,
                    "duration_ms": duration_ms,
                })),
            );
            TaskResult::success(item.task_name, output)
                .with_attempts(attempts)
                .with_duration_ms(duration_ms)
        }
        Err(err) => {
            tracing::warn!(attempts, error = %err, "Task failed");
            events.try_emit(
                "task.failed",
                Some(serde_json::json!({
                    "task": &item.task_name,
                    "attempts": attempts,
                    "error": err.to_string(),
                    "error_type": err.kind(),
                })),
            );
            TaskResult::failure(item.task_name, err.to_string(), err.to_payload())
                .with_attempts(attempts)
                .with_duration_ms(duration_ms)
                .add_metadata("error_type", serde_json::json!(err.kind()))
        }
    }
}

async fn execute_once(
    executor: &dyn TaskExecutor,
    item: &TaskItem,
    item_timeout: Option<Duration>,
) -> Result<serde_json::Value, TaskError> {
    match item_timeout {
        None => executor.execute(item).await,
        Some(budget) => match tokio::time::timeout(budget, executor.execute(item)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout {
                task: item.task_name.clone(),
                timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            }),
        },
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
