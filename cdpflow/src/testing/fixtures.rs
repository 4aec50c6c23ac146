//! Test fixtures wiring an envelope to in-memory collaborators.

use std::sync::Arc;

use crate::envelope::{ChildWorkflow, EnvelopeReport, WorkflowEnvelope};
use crate::core::WorkflowInput;
use crate::errors::CdpflowError;
use crate::events::CollectingEventSink;
use crate::notify::{CollectingChannel, DispatchFailurePolicy, NotificationDispatcher};
use crate::parser::{DefaultErrorParser, ErrorParser};

/// An envelope with a collecting channel and event sink.
#[derive(Debug)]
pub struct TestHarness {
    /// The envelope under test.
    pub envelope: WorkflowEnvelope,
    /// Every published notification.
    pub channel: Arc<CollectingChannel>,
    /// Every emitted event.
    pub events: Arc<CollectingEventSink>,
}

impl TestHarness {
    /// Creates a harness using the default error parser.
    #[must_use]
    pub fn new(workflow_name: &str) -> Self {
        Self::with_parser(workflow_name, Arc::new(DefaultErrorParser::new()))
    }

    /// Creates a harness using `parser`.
    #[must_use]
    pub fn with_parser(workflow_name: &str, parser: Arc<dyn ErrorParser>) -> Self {
        Self::build(workflow_name, parser, Arc::new(CollectingChannel::new()), DispatchFailurePolicy::Propagate)
    }

    /// Creates a harness whose channel rejects every publish.
    #[must_use]
    pub fn with_failing_channel(workflow_name: &str, policy: DispatchFailurePolicy) -> Self {
        Self::build(
            workflow_name,
            Arc::new(DefaultErrorParser::new()),
            Arc::new(CollectingChannel::failing("channel unavailable")),
            policy,
        )
    }

    fn build(
        workflow_name: &str,
        parser: Arc<dyn ErrorParser>,
        channel: Arc<CollectingChannel>,
        policy: DispatchFailurePolicy,
    ) -> Self {
        let events = Arc::new(CollectingEventSink::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), "test-topic").with_policy(policy);
        let envelope = WorkflowEnvelope::new(workflow_name, parser, dispatcher)
            .with_event_sink(events.clone());
        Self {
            envelope,
            channel,
            events,
        }
    }

    /// Runs `child` with `input`.
    pub async fn run(
        &self,
        child: &dyn ChildWorkflow,
        input: serde_json::Value,
    ) -> Result<EnvelopeReport, CdpflowError> {
        self.envelope.run(child, WorkflowInput::new(input)).await
    }
}
