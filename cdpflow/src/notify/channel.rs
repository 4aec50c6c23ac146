//! Notification channel seam and in-process implementations.

use crate::core::NotificationMessage;
use crate::errors::DispatchError;
use async_trait::async_trait;
use parking_lot::RwLock;

/// A pub/sub style destination for notifications.
///
/// Delivery semantics (acknowledgement, redelivery) belong to the channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Publishes one message.
    async fn publish(&self, message: &NotificationMessage) -> Result<(), DispatchError>;
}

/// Drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpChannel;

#[async_trait]
impl NotificationChannel for NoOpChannel {
    async fn publish(&self, _message: &NotificationMessage) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Writes messages to the log instead of an external topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChannel;

#[async_trait]
impl NotificationChannel for LoggingChannel {
    async fn publish(&self, message: &NotificationMessage) -> Result<(), DispatchError> {
        tracing::info!(
            topic = %message.topic_id,
            subject = %message.subject,
            attributes = message.attributes.len(),
            "Notification:\n{}",
            message.body
        );
        Ok(())
    }
}

/// Keeps published messages in memory. Can be switched into a failing mode
/// to exercise dispatch failure handling.
#[derive(Debug, Default)]
pub struct CollectingChannel {
    messages: RwLock<Vec<NotificationMessage>>,
    failure: RwLock<Option<String>>,
}

impl CollectingChannel {
    /// Creates a new collecting channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel whose every publish fails with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        let channel = Self::default();
        *channel.failure.write() = Some(reason.into());
        channel
    }

    /// Returns all published messages.
    #[must_use]
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.read().clone()
    }

    /// Returns the number of published messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns true if nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl NotificationChannel for CollectingChannel {
    async fn publish(&self, message: &NotificationMessage) -> Result<(), DispatchError> {
        if let Some(reason) = self.failure.read().clone() {
            return Err(DispatchError::new(&message.topic_id, reason));
        }
        self.messages.write().push(message.clone());
        Ok(())
    }
}
