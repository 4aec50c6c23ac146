//! Task status, classification route and terminal state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a single task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task ran to completion.
    Succeeded,
    /// The task failed, possibly after retries.
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One of the two externally observable end states of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Normal completion.
    Success,
    /// Failure signalled to the caller/operator.
    Abort,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// The path selected by the result classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// `notify=false, success=false`: abort without notifying.
    SilentAbort,
    /// `notify=false, success=true`: succeed without notifying.
    SilentSuccess,
    /// `notify=true, success=false`: notify, then abort.
    ErrorNotification,
    /// `notify=true, success=true`: notify, then succeed.
    SuccessNotification,
    /// Anything else: publish a synthesized diagnostic, then abort.
    ExceptionalNotification,
}

impl Route {
    /// Returns true if the route publishes a notification.
    #[must_use]
    pub fn notifies(&self) -> bool {
        matches!(
            self,
            Self::ErrorNotification | Self::SuccessNotification | Self::ExceptionalNotification
        )
    }

    /// Returns the terminal state the route ends in.
    #[must_use]
    pub fn terminal(&self) -> TerminalState {
        match self {
            Self::SilentSuccess | Self::SuccessNotification => TerminalState::Success,
            Self::SilentAbort | Self::ErrorNotification | Self::ExceptionalNotification => {
                TerminalState::Abort
            }
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SilentAbort => write!(f, "silent_abort"),
            Self::SilentSuccess => write!(f, "silent_success"),
            Self::ErrorNotification => write!(f, "error_notification"),
            Self::SuccessNotification => write!(f, "success_notification"),
            Self::ExceptionalNotification => write!(f, "exceptional_notification"),
        }
    }
}
