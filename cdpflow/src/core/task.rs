//! Workflow input and task item types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The invocation payload of a workflow run.
///
/// Shared by reference through the whole run and never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowInput(Arc<serde_json::Value>);

impl WorkflowInput {
    /// Wraps a raw payload.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Returns a top-level field, if the payload is an object.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

impl From<serde_json::Value> for WorkflowInput {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// A unit of work handed to the task executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// The task identifier.
    pub task_name: String,
    /// Reference to the backing job, script or module.
    pub module: String,
    /// Per-task configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl TaskItem {
    /// Creates a task item with an empty configuration.
    #[must_use]
    pub fn new(task_name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            module: module.into(),
            config: serde_json::Value::Null,
        }
    }

    /// Sets the configuration blob.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration in its serialized form.
    #[must_use]
    pub fn serialized_config(&self) -> String {
        self.config.to_string()
    }
}
