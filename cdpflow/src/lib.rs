//! # cdpflow
//!
//! Runtime support for batch data-processing workflows.
//!
//! Every workflow runs inside a [`WorkflowEnvelope`](envelope::WorkflowEnvelope):
//!
//! - **Envelope**: runs a child workflow and catches every failure it raises
//! - **Classification**: maps the parsed `(notify, success)` decision onto
//!   one of five routes, with a catch-all for malformed decisions
//! - **Notification**: publishes one message per notifying route
//! - **Fan-out**: runs task items with bounded concurrency, retrying
//!   concurrency exhaustion with backoff
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cdpflow::prelude::*;
//!
//! let settings = EngineSettings::from_file("settings.json").await?;
//! let envelope = settings.build_envelope(Arc::new(LoggingChannel));
//! let workflow = settings.build_jobs_workflow(provider, executor, Arc::new(NoOpEventSink));
//!
//! let report = envelope.run(&workflow, WorkflowInput::new(payload)).await?;
//! assert!(report.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod classifier;
pub mod context;
pub mod core;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod fanout;
pub mod jobs;
pub mod notify;
pub mod observability;
pub mod parser;
pub mod settings;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classifier::{classify, Classification, Diagnostic};
    pub use crate::context::ExecutionContext;
    pub use crate::core::{
        ExecutionOutcome, NotificationMessage, Route, TaskItem, TaskResult, TaskResultSet,
        TaskStatus, TerminalState, WorkflowInput,
    };
    pub use crate::envelope::{
        ChildWorkflow, EnvelopeReport, ItemFailurePolicy, JobsWorkflow, WorkflowEnvelope,
    };
    pub use crate::errors::{CdpflowError, ConfigError, DispatchError, TaskError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::fanout::{BackoffPolicy, FanoutRunner, FnExecutor, TaskExecutor};
    pub use crate::jobs::{ConfigurationProvider, JobConfigurator, JobsConfig};
    pub use crate::notify::{
        DispatchFailurePolicy, LoggingChannel, NotificationChannel, NotificationDispatcher,
    };
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::parser::{DefaultErrorParser, ErrorParser};
    pub use crate::settings::EngineSettings;
    pub use crate::utils::{generate_execution_id, iso_timestamp, Timestamp};
}
