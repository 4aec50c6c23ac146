//! Error parsing: turns a raw workflow result into a `(notify, success)`
//! decision plus a human readable message.
//!
//! The parser is an external collaborator. Its output is an untyped JSON
//! record so the classifier can reject malformed decisions instead of
//! trusting them; [`ErrorParseResult`] is the typed shape well-behaved
//! parsers produce.

mod default;
mod render;

use crate::context::ExecutionContext;
use crate::core::{MessageAttribute, MessageAttributes};
use crate::errors::CdpflowError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use default::DefaultErrorParser;

/// Field under which the envelope tags a caught child failure.
pub const ERROR_FIELD: &str = "error_info";

/// Per-workflow notification switches forwarded to the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOptions {
    /// Publish a notification for successful runs too.
    #[serde(default)]
    pub notify_on_success: bool,
    /// Ask downstream consumers to open bug tickets for failures.
    #[serde(default)]
    pub create_bug_tickets: bool,
    /// Name used in the message greeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    /// Address added as the `recipient_mail` routing attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_mail: Option<String>,
}

/// Everything a parser needs to analyze one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorParserRequest {
    /// Execution id of the envelope invocation.
    pub execution_id: String,
    /// When the invocation started.
    pub execution_start_time: Timestamp,
    /// The child's result, or `{"error_info": payload}` on failure.
    pub result: serde_json::Value,
    /// Workflow name.
    pub workflow_name: String,
    /// Workflow description.
    pub workflow_description: String,
    /// Destination topic.
    pub topic_id: String,
    /// Notification switches.
    #[serde(default)]
    pub options: NotifyOptions,
}

impl ErrorParserRequest {
    /// Builds a request for `result` in the given execution.
    #[must_use]
    pub fn new(ctx: &ExecutionContext, result: serde_json::Value) -> Self {
        Self {
            execution_id: ctx.execution_id.clone(),
            execution_start_time: ctx.started_at,
            result,
            workflow_name: ctx.workflow_name.clone(),
            workflow_description: ctx.workflow_description.clone(),
            topic_id: ctx.topic_id.clone(),
            options: NotifyOptions::default(),
        }
    }

    /// Sets the notification switches.
    #[must_use]
    pub fn with_options(mut self, options: NotifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the caught failure payload, if the child failed.
    #[must_use]
    pub fn error_info(&self) -> Option<&serde_json::Value> {
        self.result.get(ERROR_FIELD)
    }

    /// `{description} '{name}'`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.workflow_description, self.workflow_name)
    }
}

fn default_notify() -> bool {
    true
}

/// The typed parse record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorParseResult {
    /// Ask downstream consumers to open bug tickets.
    #[serde(default)]
    pub create_bug_tickets: bool,
    /// Message body.
    pub message: String,
    /// Routing attributes.
    #[serde(default)]
    pub message_attributes: MessageAttributes,
    /// Publish a notification.
    #[serde(default = "default_notify")]
    pub notify: bool,
    /// The run succeeded.
    #[serde(default)]
    pub success: bool,
    /// Message subject.
    pub subject: String,
}

impl ErrorParseResult {
    /// Creates a failure record (`notify = true`, `success = false`).
    #[must_use]
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            create_bug_tickets: false,
            message: message.into(),
            message_attributes: MessageAttributes::new(),
            notify: default_notify(),
            success: false,
            subject: subject.into(),
        }
    }

    /// Adds a string routing attribute unless one with that key exists.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message_attributes
            .entry(key.into())
            .or_insert_with(|| MessageAttribute::string(value));
        self
    }

    /// Converts to the untyped record the classifier consumes.
    pub fn to_record(&self) -> Result<serde_json::Value, CdpflowError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Analyzes a workflow result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorParser: Send + Sync {
    /// Returns the raw parse record (`notify`, `success`, `subject`,
    /// `message`, `message_attributes`).
    async fn parse(&self, request: &ErrorParserRequest) -> Result<serde_json::Value, CdpflowError>;
}
