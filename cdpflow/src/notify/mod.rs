//! Notification dispatch.

mod channel;
mod dispatcher;

#[cfg(test)]
pub use channel::MockNotificationChannel;
pub use channel::{CollectingChannel, LoggingChannel, NoOpChannel, NotificationChannel};
pub use dispatcher::{Delivery, DispatchFailurePolicy, NotificationDispatcher};
