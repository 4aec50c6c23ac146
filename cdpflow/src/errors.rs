//! Error types for cdpflow.
//!
//! Failures are recovered into data at two boundaries only: the per-item
//! boundary inside the fan-out runner ([`TaskError`]) and the child workflow
//! boundary inside the envelope. Everything else surfaces as
//! [`CdpflowError`].

use serde_json::json;
use thiserror::Error;

/// The main error type for cdpflow operations.
#[derive(Debug, Error)]
pub enum CdpflowError {
    /// Job configuration could not be produced.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Publishing a notification failed.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// The error parser failed to produce a result.
    #[error("Error parser failed: {0}")]
    Parser(String),

    /// Engine settings are invalid.
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// A child workflow failed. Only raised by child workflows; the envelope
    /// converts it into data.
    #[error("Workflow failed: {message}")]
    Workflow {
        /// Human readable failure message.
        message: String,
        /// Structured payload attached by the child.
        payload: serde_json::Value,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdpflowError {
    /// Creates a workflow failure carrying a structured payload.
    #[must_use]
    pub fn workflow(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Workflow {
            message: message.into(),
            payload,
        }
    }

    /// Returns the short type name used in failure payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Dispatch(_) => "DispatchError",
            Self::Parser(_) => "ParserError",
            Self::Settings(_) => "SettingsError",
            Self::Workflow { .. } => "WorkflowError",
            Self::Internal(_) => "InternalError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Converts the error into the raw payload the envelope forwards.
    ///
    /// A workflow failure whose payload is an object keeps every field the
    /// child attached (`subject`, `message`, `message_attributes`, ...);
    /// `Error` and `Cause` are filled in when absent.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Workflow { message, payload } => {
                let mut object = match payload {
                    serde_json::Value::Object(map) => map.clone(),
                    serde_json::Value::Null => serde_json::Map::new(),
                    other => {
                        let mut map = serde_json::Map::new();
                        map.insert("details".to_string(), other.clone());
                        map
                    }
                };
                object
                    .entry("Error")
                    .or_insert_with(|| json!(self.kind()));
                object
                    .entry("Cause")
                    .or_insert_with(|| json!(message));
                serde_json::Value::Object(object)
            }
            Self::Config(err) => err.to_payload(),
            other => json!({
                "Error": other.kind(),
                "Cause": other.to_string(),
            }),
        }
    }
}

/// Failure of a single task execution.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The execution resource refused the task because its concurrency limit
    /// was reached. Transient; retried by the fan-out runner.
    #[error("Concurrency limit exceeded for task '{task}'")]
    ConcurrencyExceeded {
        /// The task name.
        task: String,
    },

    /// The task ran and failed.
    #[error("Task '{task}' failed: {message}")]
    Failed {
        /// The task name.
        task: String,
        /// The failure message.
        message: String,
        /// Raw error payload reported by the executor.
        payload: serde_json::Value,
    },

    /// The task exceeded its time budget.
    #[error("Task '{task}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The task name.
        task: String,
        /// The budget in milliseconds.
        timeout_ms: u64,
    },

    /// The executor panicked while running the task.
    #[error("Task '{task}' panicked: {message}")]
    Panicked {
        /// The task name.
        task: String,
        /// The panic message, if any.
        message: String,
    },
}

impl TaskError {
    /// Creates a concurrency exhaustion error.
    #[must_use]
    pub fn concurrency_exceeded(task: impl Into<String>) -> Self {
        Self::ConcurrencyExceeded { task: task.into() }
    }

    /// Creates an ordinary failure without a payload.
    #[must_use]
    pub fn failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            task: task.into(),
            message: message.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Creates an ordinary failure carrying the executor's raw payload.
    #[must_use]
    pub fn failed_with_payload(
        task: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::Failed {
            task: task.into(),
            message: message.into(),
            payload,
        }
    }

    /// Returns true for the transient concurrency exhaustion condition.
    #[must_use]
    pub fn is_concurrency_exhausted(&self) -> bool {
        matches!(self, Self::ConcurrencyExceeded { .. })
    }

    /// Returns the task name the error belongs to.
    #[must_use]
    pub fn task(&self) -> &str {
        match self {
            Self::ConcurrencyExceeded { task }
            | Self::Failed { task, .. }
            | Self::Timeout { task, .. }
            | Self::Panicked { task, .. } => task,
        }
    }

    /// Returns the error type name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConcurrencyExceeded { .. } => "ConcurrencyLimitExceeded",
            Self::Failed { .. } => "TaskFailed",
            Self::Timeout { .. } => "TaskTimeout",
            Self::Panicked { .. } => "TaskPanicked",
        }
    }

    /// Converts to the payload recorded in the task result.
    ///
    /// An executor payload that is an object is passed through untouched so
    /// downstream parsing sees the executor's own fields.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Failed { payload, .. } if payload.is_object() => payload.clone(),
            _ => json!({
                "errorType": self.kind(),
                "errorMessage": self.to_string(),
            }),
        }
    }
}

/// Errors raised while turning an invocation payload into task items.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The invocation payload does not match the expected shape.
    #[error("Invalid invocation payload: {0}")]
    InvalidPayload(String),

    /// The user selected tasks that are not allowed.
    #[error("Invalid tasks selected: {}", tasks.join(", "))]
    InvalidTasks {
        /// The rejected task names.
        tasks: Vec<String>,
    },

    /// A task configuration could not be loaded.
    #[error("Unable to load config for task '{task}': {reason}")]
    TaskConfig {
        /// The task name.
        task: String,
        /// The reason.
        reason: String,
    },
}

impl ConfigError {
    /// Converts to a failure payload.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "Error": "ConfigError",
            "Cause": self.to_string(),
        })
    }
}

/// Error raised when a notification cannot be published.
#[derive(Debug, Clone, Error)]
#[error("Failed to publish to '{topic}': {reason}")]
pub struct DispatchError {
    /// The destination topic.
    pub topic: String,
    /// The reason for the failure.
    pub reason: String,
}

impl DispatchError {
    /// Creates a new dispatch error.
    #[must_use]
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_workflow_error_payload_keeps_child_fields() {
        let err = CdpflowError::workflow(
            "boom",
            json!({"subject": "Custom", "message": "details"}),
        );

        let payload = err.to_payload();
        assert_eq!(payload["subject"], "Custom");
        assert_eq!(payload["message"], "details");
        assert_eq!(payload["Error"], "WorkflowError");
        assert_eq!(payload["Cause"], "boom");
    }

    #[test]
    fn test_workflow_error_payload_wraps_scalars() {
        let err = CdpflowError::workflow("boom", json!(42));
        let payload = err.to_payload();
        assert_eq!(payload["details"], 42);
    }

    #[test]
    fn test_internal_error_payload() {
        let err = CdpflowError::Internal("bad state".to_string());
        let payload = err.to_payload();
        assert_eq!(payload["Error"], "InternalError");
        assert_eq!(payload["Cause"], "Internal error: bad state");
    }

    #[test]
    fn test_task_error_classification() {
        assert!(TaskError::concurrency_exceeded("a").is_concurrency_exhausted());
        assert!(!TaskError::failed("a", "x").is_concurrency_exhausted());
        assert_eq!(TaskError::failed("etl", "x").task(), "etl");
    }

    #[test]
    fn test_task_error_payload_passthrough() {
        let raw = json!({"errorType": "ValueError", "errorMessage": "bad", "stackTrace": []});
        let err = TaskError::failed_with_payload("etl", "bad", raw.clone());
        assert_eq!(err.to_payload(), raw);

        let err = TaskError::failed("etl", "bad");
        assert_eq!(err.to_payload()["errorType"], "TaskFailed");
    }

    #[test]
    fn test_invalid_tasks_message() {
        let err = ConfigError::InvalidTasks {
            tasks: vec!["x".to_string(), "y".to_string()],
        };
        assert_eq!(err.to_string(), "Invalid tasks selected: x, y");
    }

    #[test]
    fn test_dispatch_error_converts() {
        let err: CdpflowError = DispatchError::new("topic", "down").into();
        assert!(matches!(err, CdpflowError::Dispatch(_)));
        assert_eq!(err.to_string(), "Failed to publish to 'topic': down");
    }
}
