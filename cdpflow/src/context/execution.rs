//! Per-invocation identity.

use crate::utils::{format_timestamp, generate_execution_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// Identity of one envelope invocation, shared read-only by the child
/// workflow, the error parser and the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Unique id for this invocation.
    pub execution_id: String,
    /// When the invocation started.
    pub started_at: Timestamp,
    /// Workflow name, used in subjects.
    pub workflow_name: String,
    /// Human readable workflow description.
    pub workflow_description: String,
    /// Notification topic for this workflow.
    pub topic_id: String,
}

impl ExecutionContext {
    /// Creates a context with a fresh execution id and the current time.
    #[must_use]
    pub fn new(workflow_name: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self {
            execution_id: generate_execution_id(),
            started_at: now_utc(),
            workflow_name: workflow_name.into(),
            workflow_description: "Workflow".to_string(),
            topic_id: topic_id.into(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.workflow_description = description.into();
        self
    }

    /// Overrides the generated execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Overrides the start time.
    #[must_use]
    pub fn with_started_at(mut self, started_at: Timestamp) -> Self {
        self.started_at = started_at;
        self
    }

    /// `{description} '{name}'`, the phrase messages open with.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.workflow_description, self.workflow_name)
    }

    /// Converts to a JSON object for events.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "execution_id": self.execution_id,
            "started_at": format_timestamp(&self.started_at),
            "workflow_name": self.workflow_name,
            "topic_id": self.topic_id,
        })
    }
}
