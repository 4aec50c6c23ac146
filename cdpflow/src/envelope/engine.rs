//! The workflow envelope: run, classify, notify, terminate.

use super::{ChildWorkflow, StateEvent, WorkflowState};
use crate::classifier::{classify, Classification};
use crate::context::ExecutionContext;
use crate::core::{ExecutionOutcome, NotificationMessage, Route, TerminalState, WorkflowInput};
use crate::errors::CdpflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::notify::{Delivery, NotificationDispatcher};
use crate::parser::{ErrorParser, ErrorParserRequest, NotifyOptions, ERROR_FIELD};
use crate::utils::elapsed_ms;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// What happened in one envelope invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeReport {
    /// Execution id of the invocation.
    pub execution_id: String,
    /// Workflow name.
    pub workflow_name: String,
    /// The single terminal state reached.
    pub state: TerminalState,
    /// The classified route.
    pub route: Route,
    /// The validated outcome; absent on the catch-all route.
    pub outcome: Option<ExecutionOutcome>,
    /// Why the catch-all route was taken.
    pub diagnostic: Option<crate::classifier::Diagnostic>,
    /// The notification attempt, if the route notifies.
    pub notification: Option<Delivery>,
    /// Best-effort copies of the notification sent to chat channels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat_notifications: Vec<Delivery>,
    /// The child's result, or `{"error_info": ...}` if it failed.
    pub result: serde_json::Value,
    /// Wall time of the invocation.
    pub duration_ms: f64,
}

impl EnvelopeReport {
    /// Returns true if the run ended in `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == TerminalState::Success
    }

    /// Returns the message the channel accepted, if any.
    #[must_use]
    pub fn published(&self) -> Option<&NotificationMessage> {
        self.notification
            .as_ref()
            .filter(|d| d.is_delivered())
            .map(Delivery::message)
    }

    /// Returns true if the child failed and its failure was caught.
    #[must_use]
    pub fn child_failed(&self) -> bool {
        self.result.get(ERROR_FIELD).is_some()
    }
}

/// Wraps a child workflow so every invocation ends in exactly one of
/// `Success` or `Abort`.
///
/// The child's failures never escape: they are tagged under `error_info`
/// and handed to the error parser like any other result. The only errors
/// `run` returns are dispatch failures under
/// [`DispatchFailurePolicy::Propagate`](crate::notify::DispatchFailurePolicy)
/// and internal state machine violations.
#[derive(Clone)]
pub struct WorkflowEnvelope {
    workflow_name: String,
    workflow_description: String,
    parser: Arc<dyn ErrorParser>,
    dispatcher: NotificationDispatcher,
    options: NotifyOptions,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for WorkflowEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEnvelope")
            .field("workflow_name", &self.workflow_name)
            .field("dispatcher", &self.dispatcher)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl WorkflowEnvelope {
    /// Creates an envelope.
    #[must_use]
    pub fn new(
        workflow_name: impl Into<String>,
        parser: Arc<dyn ErrorParser>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            workflow_description: "Workflow".to_string(),
            parser,
            dispatcher,
            options: NotifyOptions::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the description used in messages.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.workflow_description = description.into();
        self
    }

    /// Sets the notification switches passed to the parser.
    #[must_use]
    pub fn with_notify_options(mut self, options: NotifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Creates the context for a new invocation.
    #[must_use]
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(&self.workflow_name, self.dispatcher.topic_id())
            .with_description(&self.workflow_description)
    }

    /// Runs `child` with a fresh execution context.
    pub async fn run(
        &self,
        child: &dyn ChildWorkflow,
        input: WorkflowInput,
    ) -> Result<EnvelopeReport, CdpflowError> {
        self.run_with_context(child, input, self.new_context()).await
    }

    /// Runs `child` under the given context.
    pub async fn run_with_context(
        &self,
        child: &dyn ChildWorkflow,
        input: WorkflowInput,
        ctx: ExecutionContext,
    ) -> Result<EnvelopeReport, CdpflowError> {
        let span = tracing::info_span!(
            "workflow",
            workflow = %ctx.workflow_name,
            execution_id = %ctx.execution_id
        );
        self.execute(child, input, ctx).instrument(span).await
    }

    async fn execute(
        &self,
        child: &dyn ChildWorkflow,
        input: WorkflowInput,
        ctx: ExecutionContext,
    ) -> Result<EnvelopeReport, CdpflowError> {
        let start = Instant::now();
        let mut state = WorkflowState::Running;
        tracing::info!("Workflow started");
        self.events.emit("workflow.started", Some(ctx.to_value())).await;

        let result = self.run_child(child, &ctx, &input).await;
        state = state.transition(StateEvent::ChildFinished)?;

        let (classification, record) = self.classify_result(&ctx, &result).await;
        tracing::info!(route = %classification.route, "Workflow classified");
        self.events
            .emit(
                "workflow.classified",
                Some(json!({
                    "execution_id": ctx.execution_id,
                    "route": classification.route,
                    "diagnostic": classification.diagnostic,
                })),
            )
            .await;
        state = state.transition(StateEvent::Classified(classification.route))?;

        let mut notification = None;
        let mut chat_notifications = Vec::new();
        if let WorkflowState::Notifying { .. } = state {
            let message = self.notification_for(&ctx, &classification, &record)?;
            let delivery = self.publish(&ctx, message).await?;
            chat_notifications = self
                .dispatcher
                .copy_to_chat(delivery.message(), classification.route.terminal())
                .await;
            notification = Some(delivery);
            state = state.transition(StateEvent::Dispatched)?;
        }

        let terminal = state.terminal().ok_or_else(|| {
            CdpflowError::Internal(format!("workflow stopped in non-terminal state {state}"))
        })?;
        let duration_ms = elapsed_ms(start);
        tracing::info!(state = %terminal, duration_ms, "Workflow completed");
        self.events
            .emit(
                "workflow.completed",
                Some(json!({
                    "execution_id": ctx.execution_id,
                    "state": terminal,
                    "route": classification.route,
                    "duration_ms": duration_ms,
                })),
            )
            .await;

        Ok(EnvelopeReport {
            execution_id: ctx.execution_id,
            workflow_name: ctx.workflow_name,
            state: terminal,
            route: classification.route,
            outcome: classification.outcome,
            diagnostic: classification.diagnostic,
            notification,
            chat_notifications,
            result,
            duration_ms,
        })
    }

    /// Runs the child under a blanket catch. Errors and panics become
    /// `{"error_info": payload}`.
    async fn run_child(
        &self,
        child: &dyn ChildWorkflow,
        ctx: &ExecutionContext,
        input: &WorkflowInput,
    ) -> serde_json::Value {
        let payload = match AssertUnwindSafe(child.run(ctx, input)).catch_unwind().await {
            Ok(Ok(value)) => return value,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Child workflow failed");
                err.to_payload()
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(panic = %message, "Child workflow panicked");
                json!({"Error": "WorkflowPanicked", "Cause": message})
            }
        };

        self.events
            .emit(
                "workflow.child_failed",
                Some(json!({"execution_id": ctx.execution_id, "error": payload})),
            )
            .await;
        json!({ ERROR_FIELD: payload })
    }

    /// Parses and classifies. Returns the record the exceptional message
    /// shows: the parser's output, or the raw result if the parser failed.
    async fn classify_result(
        &self,
        ctx: &ExecutionContext,
        result: &serde_json::Value,
    ) -> (Classification, serde_json::Value) {
        let request = ErrorParserRequest::new(ctx, result.clone()).with_options(self.options.clone());
        match self.parser.parse(&request).await {
            Ok(record) => (classify(&record), record),
            Err(err) => {
                tracing::error!(error = %err, "Error parser failed");
                (Classification::parser_failure(err.to_string()), result.clone())
            }
        }
    }

    fn notification_for(
        &self,
        ctx: &ExecutionContext,
        classification: &Classification,
        record: &serde_json::Value,
    ) -> Result<NotificationMessage, CdpflowError> {
        match (&classification.outcome, &classification.diagnostic) {
            (_, Some(diagnostic)) => Ok(self.dispatcher.exceptional_message(
                &ctx.workflow_name,
                &ctx.execution_id,
                record,
                diagnostic,
            )),
            (Some(outcome), None) => Ok(outcome.to_notification(self.dispatcher.topic_id())),
            (None, None) => Err(CdpflowError::Internal(
                "classification has neither outcome nor diagnostic".to_string(),
            )),
        }
    }

    async fn publish(
        &self,
        ctx: &ExecutionContext,
        message: NotificationMessage,
    ) -> Result<Delivery, CdpflowError> {
        match self.dispatcher.dispatch(message).await {
            Ok(delivery) => {
                let event = if delivery.is_delivered() {
                    "notification.published"
                } else {
                    "notification.failed"
                };
                self.events
                    .emit(
                        event,
                        Some(json!({
                            "execution_id": ctx.execution_id,
                            "subject": delivery.message().subject,
                        })),
                    )
                    .await;
                Ok(delivery)
            }
            Err(err) => {
                self.events
                    .emit(
                        "notification.failed",
                        Some(json!({"execution_id": ctx.execution_id, "error": err.to_string()})),
                    )
                    .await;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MockChildWorkflow;
    use crate::events::CollectingEventSink;
    use crate::notify::{CollectingChannel, DispatchFailurePolicy};
    use crate::parser::{DefaultErrorParser, MockErrorParser};
    use pretty_assertions::assert_eq;

    fn envelope(channel: Arc<CollectingChannel>) -> WorkflowEnvelope {
        WorkflowEnvelope::new(
            "nightly",
            Arc::new(DefaultErrorParser::new()),
            NotificationDispatcher::new(channel, "alerts"),
        )
    }

    fn child_returning(result: Result<serde_json::Value, CdpflowError>) -> MockChildWorkflow {
        let mut child = MockChildWorkflow::new();
        let mut result = Some(result);
        child
            .expect_run()
            .times(1)
            .returning(move |_, _| result.take().unwrap_or_else(|| Ok(json!({}))));
        child
    }

    #[tokio::test]
    async fn test_silent_success() {
        let channel = Arc::new(CollectingChannel::new());
        let child = child_returning(Ok(json!({"total": 1})));

        let report = envelope(channel.clone())
            .run(&child, WorkflowInput::default())
            .await
            .unwrap();

        assert_eq!(report.route, Route::SilentSuccess);
        assert!(report.is_success());
        assert!(report.notification.is_none());
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_child_error_is_caught_and_notified() {
        let channel = Arc::new(CollectingChannel::new());
        let child = child_returning(Err(CdpflowError::Internal("disk full".to_string())));

        let report = envelope(channel.clone())
            .run(&child, WorkflowInput::default())
            .await
            .unwrap();

        assert!(report.child_failed());
        assert_eq!(report.route, Route::ErrorNotification);
        assert_eq!(report.state, TerminalState::Abort);
        assert_eq!(channel.len(), 1);
        assert_eq!(channel.messages()[0].subject, "nightly: Failed");
        assert!(channel.messages()[0]
            .body
            .contains("InternalError: Internal error: disk full"));
    }

    #[tokio::test]
    async fn test_parser_failure_takes_catch_all() {
        let channel = Arc::new(CollectingChannel::new());
        let mut parser = MockErrorParser::new();
        parser
            .expect_parse()
            .returning(|_| Err(CdpflowError::Parser("timeout".to_string())));
        let envelope = WorkflowEnvelope::new(
            "nightly",
            Arc::new(parser),
            NotificationDispatcher::new(channel.clone(), "alerts"),
        );
        let child = child_returning(Ok(json!({"total": 0})));
        let ctx = envelope.new_context().with_execution_id("exec-9");

        let report = envelope
            .run_with_context(&child, WorkflowInput::default(), ctx)
            .await
            .unwrap();

        assert_eq!(report.route, Route::ExceptionalNotification);
        assert_eq!(report.state, TerminalState::Abort);
        let message = report.published().unwrap();
        assert!(message.body.starts_with("Unexpected error in exec-9:\n"));
        assert_eq!(message.attributes["diagnostic"].string_value, "parser_failure");
    }

    #[tokio::test]
    async fn test_dispatch_failure_propagates_by_default() {
        let channel = Arc::new(CollectingChannel::failing("topic gone"));
        let child = child_returning(Err(CdpflowError::Internal("boom".to_string())));

        let err = envelope(channel)
            .run(&child, WorkflowInput::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CdpflowError::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_dispatch_failure_can_be_logged() {
        let channel = Arc::new(CollectingChannel::failing("topic gone"));
        let events = Arc::new(CollectingEventSink::new());
        let envelope = WorkflowEnvelope::new(
            "nightly",
            Arc::new(DefaultErrorParser::new()),
            NotificationDispatcher::new(channel, "alerts")
                .with_policy(DispatchFailurePolicy::LogAndContinue),
        )
        .with_event_sink(events.clone());
        let child = child_returning(Err(CdpflowError::Internal("boom".to_string())));

        let report = envelope.run(&child, WorkflowInput::default()).await.unwrap();

        assert_eq!(report.state, TerminalState::Abort);
        assert!(report.published().is_none());
        assert!(report.notification.is_some());
        assert_eq!(
            events.event_types(),
            vec![
                "workflow.started",
                "workflow.child_failed",
                "workflow.classified",
                "notification.failed",
                "workflow.completed",
            ]
        );
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*boxed), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
