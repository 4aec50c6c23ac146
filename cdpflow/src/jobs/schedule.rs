//! Schedule gates decide whether a scheduled task is due.

use super::TaskConfig;
use crate::errors::CdpflowError;
use async_trait::async_trait;

/// Decides whether a task is due on a scheduled invocation.
///
/// Implementations usually consult the task's `run.frequency` and some
/// record of previous runs kept outside this crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduleGate: Send + Sync {
    /// Returns true if `task` should run now. An error skips the task.
    async fn admit(&self, task: &str, config: &TaskConfig) -> Result<bool, CdpflowError>;

    /// Records that an admitted task was triggered, so the next `admit`
    /// sees the new run. Skipped when the user turned `update_run_db` off.
    async fn record_run(&self, task: &str, config: &TaskConfig) -> Result<(), CdpflowError>;
}

/// Admits every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRun;

#[async_trait]
impl ScheduleGate for AlwaysRun {
    async fn admit(&self, _task: &str, _config: &TaskConfig) -> Result<bool, CdpflowError> {
        Ok(true)
    }

    async fn record_run(&self, _task: &str, _config: &TaskConfig) -> Result<(), CdpflowError> {
        Ok(())
    }
}
