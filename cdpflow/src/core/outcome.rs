//! Classified execution outcomes and notification messages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A routing attribute attached to a published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttribute {
    /// Attribute data type, `String` for everything this crate produces.
    #[serde(rename = "DataType")]
    pub data_type: String,
    /// Attribute value.
    #[serde(rename = "StringValue")]
    pub string_value: String,
}

impl MessageAttribute {
    /// Creates a string attribute.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: value.into(),
        }
    }
}

/// Routing attributes keyed by name.
pub type MessageAttributes = BTreeMap<String, MessageAttribute>;

/// The validated `(notify, success)` decision plus its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Whether a notification is published.
    pub notify: bool,
    /// Whether the run ends in success.
    pub success: bool,
    /// Message subject.
    #[serde(default)]
    pub subject: String,
    /// Message body.
    #[serde(default)]
    pub message: String,
    /// Routing attributes.
    #[serde(default)]
    pub message_attributes: MessageAttributes,
}

impl ExecutionOutcome {
    /// Creates an outcome with an empty message.
    #[must_use]
    pub fn new(notify: bool, success: bool) -> Self {
        Self {
            notify,
            success,
            subject: String::new(),
            message: String::new(),
            message_attributes: MessageAttributes::new(),
        }
    }

    /// Sets subject and body.
    #[must_use]
    pub fn with_message(mut self, subject: impl Into<String>, message: impl Into<String>) -> Self {
        self.subject = subject.into();
        self.message = message.into();
        self
    }

    /// Adds a string routing attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message_attributes
            .insert(key.into(), MessageAttribute::string(value));
        self
    }

    /// Builds the notification for this outcome.
    #[must_use]
    pub fn to_notification(&self, topic_id: impl Into<String>) -> NotificationMessage {
        NotificationMessage {
            topic_id: topic_id.into(),
            subject: self.subject.clone(),
            body: self.message.clone(),
            attributes: self.message_attributes.clone(),
        }
    }
}

/// A message published to a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Destination topic/channel id.
    pub topic_id: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Routing attributes.
    #[serde(default)]
    pub attributes: MessageAttributes,
}

impl NotificationMessage {
    /// Creates a message without attributes.
    #[must_use]
    pub fn new(
        topic_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            subject: subject.into(),
            body: body.into(),
            attributes: MessageAttributes::new(),
        }
    }

    /// Adds a string routing attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), MessageAttribute::string(value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_attribute_wire_shape() {
        let attr = MessageAttribute::string("ops@example.com");
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"DataType": "String", "StringValue": "ops@example.com"})
        );
    }

    #[test]
    fn test_outcome_to_notification() {
        let outcome = ExecutionOutcome::new(true, false)
            .with_message("etl: Failed", "details")
            .with_attribute("recipient_mail", "ops@example.com");

        let message = outcome.to_notification("alerts");
        assert_eq!(message.topic_id, "alerts");
        assert_eq!(message.subject, "etl: Failed");
        assert_eq!(message.body, "details");
        assert_eq!(
            message.attributes.get("recipient_mail").map(|a| a.string_value.as_str()),
            Some("ops@example.com")
        );
    }
}
