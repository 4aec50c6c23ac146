//! Engine settings.
//!
//! Everything a deployment tunes lives in [`EngineSettings`], loadable from
//! a JSON document. Missing fields take their defaults, so `{}` is a valid
//! settings file.

use crate::envelope::{ItemFailurePolicy, JobsWorkflow, WorkflowEnvelope};
use crate::errors::CdpflowError;
use crate::events::EventSink;
use crate::fanout::{BackoffPolicy, FanoutRunner, TaskExecutor, DEFAULT_MAX_CONCURRENCY};
use crate::jobs::{ConfigurationProvider, JobsConfig};
use crate::notify::{DispatchFailurePolicy, NotificationChannel, NotificationDispatcher};
use crate::parser::{DefaultErrorParser, NotifyOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn default_workflow_name() -> String {
    "workflow".to_string()
}

fn default_workflow_description() -> String {
    "Workflow".to_string()
}

fn default_topic_id() -> String {
    "notifications".to_string()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_recipient_name() -> String {
    "Team".to_string()
}

fn default_signature() -> String {
    "Workflow Notification".to_string()
}

/// Configuration of one envelope deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Workflow name, used in subjects.
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,
    /// Human description, used in message bodies.
    #[serde(default = "default_workflow_description")]
    pub workflow_description: String,
    /// Notification topic.
    #[serde(default = "default_topic_id")]
    pub topic_id: String,
    /// Fan-out concurrency cap.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retry schedule for concurrency exhaustion.
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Per-attempt budget of a task item in milliseconds.
    #[serde(default)]
    pub item_timeout_ms: Option<u64>,
    /// What happens when publishing fails.
    #[serde(default)]
    pub dispatch_policy: DispatchFailurePolicy,
    /// What the jobs workflow does with failed items.
    #[serde(default)]
    pub item_failure_policy: ItemFailurePolicy,
    /// Greeting name when the invocation names none.
    #[serde(default = "default_recipient_name")]
    pub recipient_name: String,
    /// Signature line of every message.
    #[serde(default = "default_signature")]
    pub signature: String,
    /// Notification switches forwarded to the parser.
    #[serde(default)]
    pub notify: NotifyOptions,
    /// Job configurator settings.
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workflow_name: default_workflow_name(),
            workflow_description: default_workflow_description(),
            topic_id: default_topic_id(),
            max_concurrency: default_max_concurrency(),
            backoff: BackoffPolicy::default(),
            item_timeout_ms: None,
            dispatch_policy: DispatchFailurePolicy::default(),
            item_failure_policy: ItemFailurePolicy::default(),
            recipient_name: default_recipient_name(),
            signature: default_signature(),
            notify: NotifyOptions::default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Creates default settings for `workflow_name`.
    #[must_use]
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON settings document.
    pub fn from_json_str(json: &str) -> Result<Self, CdpflowError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CdpflowError::Settings(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates a JSON settings file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CdpflowError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CdpflowError::Settings(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
        Self::from_json_str(&json)
    }

    /// Checks values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), CdpflowError> {
        if self.workflow_name.trim().is_empty() {
            return Err(CdpflowError::Settings("workflow_name must not be empty".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(CdpflowError::Settings("max_concurrency must be >= 1".to_string()));
        }
        if self.backoff.max_attempts == 0 {
            return Err(CdpflowError::Settings(
                "backoff.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.item_timeout_ms == Some(0) {
            return Err(CdpflowError::Settings("item_timeout_ms must be > 0".to_string()));
        }
        self.backoff.validate().map_err(CdpflowError::Settings)
    }

    /// Sets the workflow description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.workflow_description = description.into();
        self
    }

    /// Sets the notification topic.
    #[must_use]
    pub fn with_topic_id(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = topic_id.into();
        self
    }

    /// Sets the fan-out concurrency cap.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the per-attempt item timeout.
    #[must_use]
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the dispatch failure policy.
    #[must_use]
    pub fn with_dispatch_policy(mut self, policy: DispatchFailurePolicy) -> Self {
        self.dispatch_policy = policy;
        self
    }

    /// Sets the item failure policy.
    #[must_use]
    pub fn with_item_failure_policy(mut self, policy: ItemFailurePolicy) -> Self {
        self.item_failure_policy = policy;
        self
    }

    /// Sets the notification switches.
    #[must_use]
    pub fn with_notify_options(mut self, notify: NotifyOptions) -> Self {
        self.notify = notify;
        self
    }

    /// Sets the job configurator settings.
    #[must_use]
    pub fn with_jobs(mut self, jobs: JobsConfig) -> Self {
        self.jobs = jobs;
        self
    }

    /// Builds the fan-out runner.
    #[must_use]
    pub fn build_runner(&self) -> FanoutRunner {
        let runner = FanoutRunner::new(self.max_concurrency).with_backoff(self.backoff.clone());
        match self.item_timeout_ms {
            Some(ms) => runner.with_item_timeout(Duration::from_millis(ms)),
            None => runner,
        }
    }

    /// Builds the default error parser.
    #[must_use]
    pub fn build_parser(&self) -> DefaultErrorParser {
        DefaultErrorParser::new()
            .with_recipient_name(&self.recipient_name)
            .with_signature(&self.signature)
    }

    /// Builds an envelope publishing to `channel`.
    #[must_use]
    pub fn build_envelope(&self, channel: Arc<dyn NotificationChannel>) -> WorkflowEnvelope {
        let dispatcher =
            NotificationDispatcher::new(channel, &self.topic_id).with_policy(self.dispatch_policy);
        WorkflowEnvelope::new(&self.workflow_name, Arc::new(self.build_parser()), dispatcher)
            .with_description(&self.workflow_description)
            .with_notify_options(self.notify.clone())
    }

    /// Builds the jobs workflow around `provider` and `executor`.
    #[must_use]
    pub fn build_jobs_workflow(
        &self,
        provider: Arc<dyn ConfigurationProvider>,
        executor: Arc<dyn TaskExecutor>,
        events: Arc<dyn EventSink>,
    ) -> JobsWorkflow {
        JobsWorkflow::new(provider, executor)
            .with_runner(self.build_runner().with_event_sink(events))
            .with_failure_policy(self.item_failure_policy)
    }
}
