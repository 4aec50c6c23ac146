//! Per-item task results and their aggregate.

use super::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// The outcome of executing one [`TaskItem`](super::TaskItem).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_name: String,
    /// Success or failure.
    pub status: TaskStatus,
    /// Output reported by the executor (successful executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Raw error payload (failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    /// Error message (failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Number of executor invocations, retries included.
    pub attempts: u32,
    /// Wall time spent on the item, retries and backoff included.
    pub duration_ms: f64,
    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(task_name: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            task_name: task_name.into(),
            status: TaskStatus::Succeeded,
            output: Some(output),
            error: None,
            error_message: None,
            attempts: 1,
            duration_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        task_name: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            status: TaskStatus::Failed,
            output: None,
            error: Some(payload),
            error_message: Some(message.into()),
            attempts: 1,
            duration_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// All results of one fan-out, in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResultSet {
    results: Vec<TaskResult>,
    /// Wall time of the whole fan-out.
    pub duration_ms: f64,
}

impl TaskResultSet {
    /// Creates a result set.
    #[must_use]
    pub fn new(results: Vec<TaskResult>, duration_ms: f64) -> Self {
        Self {
            results,
            duration_ms,
        }
    }

    /// Returns the number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns all results.
    #[must_use]
    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    /// Returns the result for a task.
    #[must_use]
    pub fn get(&self, task_name: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_name == task_name)
    }

    /// Number of successful results.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of failed results.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Returns true if any item failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| !r.is_success())
    }

    /// Returns the failed results.
    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Renders the failures in the shape the error parser understands:
    /// `{"<group>": [{"item": ..., "error": ...}]}`.
    #[must_use]
    pub fn error_summary(&self, group: &str) -> serde_json::Value {
        let entries: Vec<_> = self
            .failures()
            .map(|r| {
                json!({
                    "item": r.task_name,
                    "error": r.error.clone().unwrap_or_else(|| json!({
                        "errorMessage": r.error_message,
                    })),
                })
            })
            .collect();
        json!({ group: entries })
    }

    /// Converts to the JSON document a child workflow reports.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "total": self.len(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "duration_ms": self.duration_ms,
            "results": self.results,
        })
    }
}

impl IntoIterator for TaskResultSet {
    type Item = TaskResult;
    type IntoIter = std::vec::IntoIter<TaskResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
