//! Job configuration: which tasks run, and with what settings.

mod configurator;
mod schedule;
mod task_config;
mod user_config;

use crate::core::{TaskItem, WorkflowInput};
use crate::errors::CdpflowError;
use async_trait::async_trait;

pub use configurator::{JobConfigurator, JobSpec, JobsConfig};
#[cfg(test)]
pub use schedule::MockScheduleGate;
pub use schedule::{AlwaysRun, ScheduleGate};
#[cfg(test)]
pub use task_config::MockTaskConfigSource;
pub use task_config::{
    DirectoryTaskConfigSource, InMemoryTaskConfigSource, TaskConfig, TaskConfigSource,
    TaskRunConfig,
};
pub use user_config::{UserConfig, UserTaskConfig};

/// Produces the task items of one workflow invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigurationProvider: Send + Sync {
    /// Builds the task items for `input`.
    async fn configure(&self, input: &WorkflowInput) -> Result<Vec<TaskItem>, CdpflowError>;
}
