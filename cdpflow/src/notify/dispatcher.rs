//! Notification dispatch with an explicit failure policy.

use super::NotificationChannel;
use crate::classifier::Diagnostic;
use crate::core::{MessageAttributes, NotificationMessage, TerminalState};
use crate::errors::DispatchError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What happens when publishing a notification fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailurePolicy {
    /// Surface the failure to the caller of the envelope.
    #[default]
    Propagate,
    /// Log the failure and continue to the planned terminal state.
    LogAndContinue,
}

/// The result of one dispatch attempt that did not propagate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    /// The channel accepted the message.
    Delivered {
        /// The published message.
        message: NotificationMessage,
    },
    /// The channel rejected the message and the policy swallowed it.
    Dropped {
        /// The message that could not be published.
        message: NotificationMessage,
        /// The channel's error.
        error: String,
    },
}

impl Delivery {
    /// Returns the message regardless of delivery status.
    #[must_use]
    pub fn message(&self) -> &NotificationMessage {
        match self {
            Self::Delivered { message } | Self::Dropped { message, .. } => message,
        }
    }

    /// Returns true if the channel accepted the message.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[derive(Clone)]
struct ChatTarget {
    channel: Arc<dyn NotificationChannel>,
    topic_id: String,
}

impl ChatTarget {
    async fn publish(&self, message: &NotificationMessage) -> Delivery {
        let mut message = message.clone();
        message.topic_id.clone_from(&self.topic_id);
        match self.channel.publish(&message).await {
            Ok(()) => {
                tracing::debug!(topic = %message.topic_id, "Chat notification published");
                Delivery::Delivered { message }
            }
            Err(err) => {
                tracing::error!(topic = %message.topic_id, error = %err, "Unable to send chat notification");
                Delivery::Dropped {
                    message,
                    error: err.to_string(),
                }
            }
        }
    }
}

/// Publishes notifications to a primary topic, optionally copying them to
/// chat channels. Never retries.
///
/// The primary topic follows the [`DispatchFailurePolicy`]. Chat copies are
/// always best effort: a failed copy is logged and recorded, never raised.
#[derive(Clone)]
pub struct NotificationDispatcher {
    channel: Arc<dyn NotificationChannel>,
    topic_id: String,
    policy: DispatchFailurePolicy,
    chat: Option<ChatTarget>,
    failures: Option<ChatTarget>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("topic_id", &self.topic_id)
            .field("policy", &self.policy)
            .field("chat", &self.chat.as_ref().map(|t| &t.topic_id))
            .field("failures", &self.failures.as_ref().map(|t| &t.topic_id))
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher with the default `Propagate` policy.
    #[must_use]
    pub fn new(channel: Arc<dyn NotificationChannel>, topic_id: impl Into<String>) -> Self {
        Self {
            channel,
            topic_id: topic_id.into(),
            policy: DispatchFailurePolicy::default(),
            chat: None,
            failures: None,
        }
    }

    /// Copies every dispatched message to a chat channel.
    #[must_use]
    pub fn with_secondary(
        mut self,
        channel: Arc<dyn NotificationChannel>,
        topic_id: impl Into<String>,
    ) -> Self {
        self.chat = Some(ChatTarget {
            channel,
            topic_id: topic_id.into(),
        });
        self
    }

    /// Copies messages of aborting runs to a dedicated failures channel.
    #[must_use]
    pub fn with_failure_channel(
        mut self,
        channel: Arc<dyn NotificationChannel>,
        topic_id: impl Into<String>,
    ) -> Self {
        self.failures = Some(ChatTarget {
            channel,
            topic_id: topic_id.into(),
        });
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DispatchFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the destination topic.
    #[must_use]
    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    /// Returns the failure policy.
    #[must_use]
    pub fn policy(&self) -> DispatchFailurePolicy {
        self.policy
    }

    /// Publishes `subject`/`body` with routing attributes to the topic.
    pub async fn notify(
        &self,
        subject: impl Into<String>,
        body: impl Into<String>,
        attributes: MessageAttributes,
    ) -> Result<Delivery, DispatchError> {
        let mut message = NotificationMessage::new(&self.topic_id, subject, body);
        message.attributes = attributes;
        self.dispatch(message).await
    }

    /// Publishes a prepared message, applying the failure policy.
    pub async fn dispatch(&self, message: NotificationMessage) -> Result<Delivery, DispatchError> {
        match self.channel.publish(&message).await {
            Ok(()) => {
                tracing::info!(
                    topic = %message.topic_id,
                    subject = %message.subject,
                    "Notification published"
                );
                Ok(Delivery::Delivered { message })
            }
            Err(err) => match self.policy {
                DispatchFailurePolicy::Propagate => {
                    tracing::error!(topic = %message.topic_id, error = %err, "Notification failed");
                    Err(err)
                }
                DispatchFailurePolicy::LogAndContinue => {
                    tracing::error!(
                        topic = %message.topic_id,
                        error = %err,
                        "Notification failed, continuing"
                    );
                    Ok(Delivery::Dropped {
                        message,
                        error: err.to_string(),
                    })
                }
            },
        }
    }

    /// Copies `message` to the chat channels: the secondary channel always,
    /// the failures channel only when the run ends in `Abort`.
    ///
    /// Returns one delivery per attempted copy. Never fails.
    pub async fn copy_to_chat(
        &self,
        message: &NotificationMessage,
        terminal: TerminalState,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        if let Some(chat) = &self.chat {
            deliveries.push(chat.publish(message).await);
        }
        if terminal == TerminalState::Abort {
            if let Some(failures) = &self.failures {
                deliveries.push(failures.publish(message).await);
            }
        }
        deliveries
    }

    /// Builds the fixed-format diagnostic for the catch-all route.
    ///
    /// The body is `Unexpected error in {execution_id}:\n{raw}`; the
    /// classifier's record is deliberately not trusted for content.
    #[must_use]
    pub fn exceptional_message(
        &self,
        workflow_name: &str,
        execution_id: &str,
        raw: &serde_json::Value,
        diagnostic: &Diagnostic,
    ) -> NotificationMessage {
        let rendered = match raw {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        NotificationMessage::new(
            &self.topic_id,
            format!("{workflow_name}: Unexpected error"),
            format!("Unexpected error in {execution_id}:\n{rendered}"),
        )
        .with_attribute("diagnostic", diagnostic.label())
        .with_attribute("diagnostic_detail", diagnostic.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FlagProblem;
    use crate::notify::{CollectingChannel, MockNotificationChannel};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_notify_delivers() {
        let channel = Arc::new(CollectingChannel::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), "alerts");

        let delivery = dispatcher
            .notify("etl: Failed", "body", MessageAttributes::new())
            .await
            .unwrap();

        assert!(delivery.is_delivered());
        assert_eq!(channel.len(), 1);
        assert_eq!(channel.messages()[0].topic_id, "alerts");
    }

    #[tokio::test]
    async fn test_propagate_policy_returns_error() {
        let channel = Arc::new(CollectingChannel::failing("unavailable"));
        let dispatcher = NotificationDispatcher::new(channel, "alerts");

        let err = dispatcher
            .notify("s", "b", MessageAttributes::new())
            .await
            .unwrap_err();
        assert_eq!(err.reason, "unavailable");
    }

    #[tokio::test]
    async fn test_log_and_continue_policy_drops() {
        let mut mock = MockNotificationChannel::new();
        mock.expect_publish()
            .times(1)
            .returning(|m| Err(DispatchError::new(&m.topic_id, "throttled")));

        let dispatcher = NotificationDispatcher::new(Arc::new(mock), "alerts")
            .with_policy(DispatchFailurePolicy::LogAndContinue);

        let delivery = dispatcher
            .dispatch(NotificationMessage::new("alerts", "s", "b"))
            .await
            .unwrap();

        assert!(!delivery.is_delivered());
        assert_eq!(delivery.message().subject, "s");
    }

    #[tokio::test]
    async fn test_chat_copy_on_abort_reaches_both_channels() {
        let chat = Arc::new(CollectingChannel::new());
        let failures = Arc::new(CollectingChannel::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(CollectingChannel::new()), "alerts")
            .with_secondary(chat.clone(), "data-team")
            .with_failure_channel(failures.clone(), "failures");

        let message = NotificationMessage::new("alerts", "etl: Failed", "body");
        let deliveries = dispatcher.copy_to_chat(&message, TerminalState::Abort).await;

        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(Delivery::is_delivered));
        assert_eq!(chat.messages()[0].topic_id, "data-team");
        assert_eq!(failures.messages()[0].topic_id, "failures");
        assert_eq!(failures.messages()[0].subject, "etl: Failed");
    }

    #[tokio::test]
    async fn test_chat_copy_on_success_skips_failures_channel() {
        let chat = Arc::new(CollectingChannel::new());
        let failures = Arc::new(CollectingChannel::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(CollectingChannel::new()), "alerts")
            .with_secondary(chat.clone(), "data-team")
            .with_failure_channel(failures.clone(), "failures");

        let message = NotificationMessage::new("alerts", "etl: Succeeded", "body");
        let deliveries = dispatcher.copy_to_chat(&message, TerminalState::Success).await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(chat.len(), 1);
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_chat_copy_failure_is_recorded_not_raised() {
        let mut mock = MockNotificationChannel::new();
        mock.expect_publish()
            .times(1)
            .returning(|m| Err(DispatchError::new(&m.topic_id, "webhook gone")));
        let failures = Arc::new(CollectingChannel::new());
        let dispatcher = NotificationDispatcher::new(Arc::new(CollectingChannel::new()), "alerts")
            .with_secondary(Arc::new(mock), "data-team")
            .with_failure_channel(failures.clone(), "failures");

        let message = NotificationMessage::new("alerts", "etl: Failed", "body");
        let deliveries = dispatcher.copy_to_chat(&message, TerminalState::Abort).await;

        assert!(matches!(&deliveries[0], Delivery::Dropped { error, .. } if error.contains("webhook gone")));
        assert!(deliveries[1].is_delivered());
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn test_no_chat_channels_means_no_copies() {
        let dispatcher = NotificationDispatcher::new(Arc::new(CollectingChannel::new()), "alerts");
        let message = NotificationMessage::new("alerts", "s", "b");
        assert!(dispatcher.copy_to_chat(&message, TerminalState::Abort).await.is_empty());
    }

    #[test]
    fn test_exceptional_message_format() {
        let dispatcher = NotificationDispatcher::new(Arc::new(CollectingChannel::new()), "alerts");
        let diagnostic = Diagnostic::Malformed {
            problems: vec![("success".to_string(), FlagProblem::Missing)],
        };

        let message = dispatcher.exceptional_message(
            "nightly",
            "exec-1",
            &serde_json::json!({"notify": true}),
            &diagnostic,
        );

        assert_eq!(message.subject, "nightly: Unexpected error");
        assert_eq!(
            message.body,
            "Unexpected error in exec-1:\n{\n  \"notify\": true\n}"
        );
        assert_eq!(message.attributes["diagnostic"].string_value, "malformed_outcome");
    }

    #[test]
    fn test_exceptional_message_keeps_raw_strings() {
        let dispatcher = NotificationDispatcher::new(Arc::new(CollectingChannel::new()), "alerts");
        let diagnostic = Diagnostic::ParserFailure {
            reason: "boom".to_string(),
        };

        let message =
            dispatcher.exceptional_message("nightly", "exec-2", &serde_json::json!("raw"), &diagnostic);
        assert_eq!(message.body, "Unexpected error in exec-2:\nraw");
    }
}
