//! Where lifecycle events go.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::Level;

/// Receives the lifecycle events of envelope runs and fan-outs.
///
/// `emit` is awaited on the envelope's control path. `try_emit` is called
/// from fan-out workers and must return immediately. Neither may fail: a
/// sink that cannot record an event drops it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Records `event_type` (for example `workflow.classified`) with its
    /// payload.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Records an event without awaiting.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

fn str_field<'a>(data: Option<&'a Value>, key: &str) -> Option<&'a str> {
    data.and_then(|d| d.get(key)).and_then(Value::as_str)
}

/// Turns events into log lines.
///
/// The `execution_id` and `task` keys of a payload become log fields, so a
/// JSON log can be filtered per run or per task item.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs at `level`. Anything other than `DEBUG` logs at `INFO`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at `DEBUG`.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn write(&self, event_type: &str, data: Option<&Value>) {
        let execution_id = str_field(data, "execution_id").unwrap_or_default();
        let task = str_field(data, "task").unwrap_or_default();
        let payload = data.map(ToString::to_string).unwrap_or_default();
        if self.level == Level::DEBUG {
            tracing::debug!(event_type, execution_id, task, payload = %payload, "Event: {event_type}");
        } else {
            tracing::info!(event_type, execution_id, task, payload = %payload, "Event: {event_type}");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.write(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.write(event_type, data.as_ref());
    }
}

/// One event kept by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Dotted event name.
    pub event_type: String,
    /// Payload as emitted.
    pub data: Option<Value>,
}

impl RecordedEvent {
    /// The run the event belongs to, if the payload names one.
    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        str_field(self.data.as_ref(), "execution_id")
    }

    /// The task item the event is about, for `task.*` events.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        str_field(self.data.as_ref(), "task")
    }
}

/// Keeps events in memory in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
        });
    }

    fn select(&self, keep: impl Fn(&RecordedEvent) -> bool) -> Vec<RecordedEvent> {
        self.events.read().iter().filter(|e| keep(e)).cloned().collect()
    }

    /// Every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Event names in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Events whose name starts with `prefix`, e.g. `task.` or
    /// `notification.failed`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.select(|e| e.event_type.starts_with(prefix))
    }

    /// Events of one envelope run.
    #[must_use]
    pub fn for_execution(&self, execution_id: &str) -> Vec<RecordedEvent> {
        self.select(|e| e.execution_id() == Some(execution_id))
    }

    /// Events about one task item.
    #[must_use]
    pub fn for_task(&self, task: &str) -> Vec<RecordedEvent> {
        self.select(|e| e.task() == Some(task))
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True before the first event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}
