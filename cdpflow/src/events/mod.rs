//! Lifecycle events.
//!
//! The envelope emits `workflow.*` and `notification.*` events, the fan-out
//! runner emits `task.*` and `fanout.completed`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};
