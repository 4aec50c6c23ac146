//! Child workflows run inside the envelope.

use crate::context::ExecutionContext;
use crate::core::WorkflowInput;
use crate::errors::CdpflowError;
use crate::fanout::{FanoutRunner, TaskExecutor};
use crate::jobs::ConfigurationProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// The workflow wrapped by the envelope.
///
/// An `Err` (or a panic) is caught by the envelope and classified; the
/// payload of [`CdpflowError::Workflow`] is forwarded untouched, so a child
/// can attach `subject`, `message` and `message_attributes` to steer the
/// notification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChildWorkflow: Send + Sync {
    /// Runs the workflow.
    async fn run(
        &self,
        ctx: &ExecutionContext,
        input: &WorkflowInput,
    ) -> Result<serde_json::Value, CdpflowError>;
}

/// What [`JobsWorkflow`] does when some task items fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
    /// Report the failures in the result and finish normally.
    #[default]
    Absorb,
    /// Fail the workflow with an `error_summary` of the failed items.
    Escalate,
}

/// Configure jobs, then fan out one task per job.
#[derive(Clone)]
pub struct JobsWorkflow {
    provider: Arc<dyn ConfigurationProvider>,
    executor: Arc<dyn TaskExecutor>,
    runner: FanoutRunner,
    failure_policy: ItemFailurePolicy,
    summary_group: String,
}

impl std::fmt::Debug for JobsWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobsWorkflow")
            .field("runner", &self.runner)
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl JobsWorkflow {
    /// Creates a workflow with the default runner that absorbs item
    /// failures.
    #[must_use]
    pub fn new(provider: Arc<dyn ConfigurationProvider>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            provider,
            executor,
            runner: FanoutRunner::default(),
            failure_policy: ItemFailurePolicy::default(),
            summary_group: "tasks".to_string(),
        }
    }

    /// Sets the fan-out runner.
    #[must_use]
    pub fn with_runner(mut self, runner: FanoutRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Sets the item failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: ItemFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the heading failed items are grouped under.
    #[must_use]
    pub fn with_summary_group(mut self, group: impl Into<String>) -> Self {
        self.summary_group = group.into();
        self
    }
}

#[async_trait]
impl ChildWorkflow for JobsWorkflow {
    async fn run(
        &self,
        ctx: &ExecutionContext,
        input: &WorkflowInput,
    ) -> Result<serde_json::Value, CdpflowError> {
        let items = self.provider.configure(input).await?;
        tracing::info!(
            execution_id = %ctx.execution_id,
            items = items.len(),
            "Running jobs"
        );

        let results = self.runner.run_all(self.executor.clone(), items).await;

        if results.has_failures() && self.failure_policy == ItemFailurePolicy::Escalate {
            return Err(CdpflowError::workflow(
                format!("{} of {} tasks failed", results.failed(), results.len()),
                json!({
                    "error_summary": results.error_summary(&self.summary_group),
                    "results": results.to_value(),
                }),
            ));
        }

        let processed: Vec<&str> = results
            .results()
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.task_name.as_str())
            .collect();
        let mut output = results.to_value();
        output["use_case_name_list"] = json!(processed);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskItem;
    use crate::errors::TaskError;
    use crate::fanout::FnExecutor;
    use crate::jobs::MockConfigurationProvider;

    fn provider(names: &'static [&'static str]) -> Arc<MockConfigurationProvider> {
        let mut provider = MockConfigurationProvider::new();
        provider
            .expect_configure()
            .returning(move |_| Ok(names.iter().map(|n| TaskItem::new(*n, "job")).collect()));
        Arc::new(provider)
    }

    fn executor() -> Arc<dyn TaskExecutor> {
        Arc::new(FnExecutor::new("flaky", |item: TaskItem| async move {
            if item.task_name == "bad" {
                Err(TaskError::failed(&item.task_name, "exit code 1"))
            } else {
                Ok(json!({"rows": 1}))
            }
        }))
    }

    #[tokio::test]
    async fn test_absorbs_item_failures() {
        let workflow = JobsWorkflow::new(provider(&["a", "bad", "c"]), executor());
        let ctx = ExecutionContext::new("nightly", "alerts");

        let output = workflow.run(&ctx, &WorkflowInput::default()).await.unwrap();

        assert_eq!(output["total"], 3);
        assert_eq!(output["succeeded"], 2);
        assert_eq!(output["failed"], 1);
        assert_eq!(output["use_case_name_list"], json!(["a", "c"]));
    }

    #[tokio::test]
    async fn test_escalates_item_failures() {
        let workflow = JobsWorkflow::new(provider(&["a", "bad"]), executor())
            .with_failure_policy(ItemFailurePolicy::Escalate);
        let ctx = ExecutionContext::new("nightly", "alerts");

        let err = workflow.run(&ctx, &WorkflowInput::default()).await.unwrap_err();

        assert_eq!(err.to_string(), "Workflow failed: 1 of 2 tasks failed");
        let payload = err.to_payload();
        assert_eq!(payload["error_summary"]["tasks"][0]["item"], "bad");
    }

    #[tokio::test]
    async fn test_configuration_errors_propagate() {
        let mut provider = MockConfigurationProvider::new();
        provider.expect_configure().returning(|_| {
            Err(crate::errors::ConfigError::InvalidTasks {
                tasks: vec!["rogue".to_string()],
            }
            .into())
        });
        let workflow = JobsWorkflow::new(Arc::new(provider), executor());
        let ctx = ExecutionContext::new("nightly", "alerts");

        let err = workflow.run(&ctx, &WorkflowInput::default()).await.unwrap_err();
        assert!(matches!(err, CdpflowError::Config(_)));
    }
}
