//! The envelope's finite state machine.
//!
//! ```text
//! Running --ChildFinished--> Classifying --Classified(route)--> Notifying --Dispatched--> Success | Abort
//!                                         \--Classified(silent route)----------------------> Success | Abort
//! ```

use crate::core::{Route, TerminalState};
use crate::errors::CdpflowError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an invocation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    /// The child workflow is running.
    Running,
    /// The result is being parsed and classified.
    Classifying,
    /// A notification for `route` is being published.
    Notifying {
        /// The route that requested the notification.
        route: Route,
    },
    /// Terminal: the run succeeded.
    Success,
    /// Terminal: the run was aborted.
    Abort,
}

/// Inputs that move the machine forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// The child returned, failed or panicked.
    ChildFinished,
    /// The classifier picked a route.
    Classified(Route),
    /// The dispatcher finished, whatever the delivery outcome.
    Dispatched,
}

impl WorkflowState {
    /// Returns true for `Success` and `Abort`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal().is_some()
    }

    /// Returns the terminal state, if reached.
    #[must_use]
    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            Self::Success => Some(TerminalState::Success),
            Self::Abort => Some(TerminalState::Abort),
            _ => None,
        }
    }

    /// Applies `event`. Terminal states accept no events.
    pub fn transition(self, event: StateEvent) -> Result<Self, CdpflowError> {
        let next = match (self, event) {
            (Self::Running, StateEvent::ChildFinished) => Self::Classifying,
            (Self::Classifying, StateEvent::Classified(route)) if route.notifies() => {
                Self::Notifying { route }
            }
            (Self::Classifying, StateEvent::Classified(route)) => Self::from(route.terminal()),
            (Self::Notifying { route }, StateEvent::Dispatched) => Self::from(route.terminal()),
            (state, event) => {
                return Err(CdpflowError::Internal(format!(
                    "invalid transition from {state} on {event:?}"
                )))
            }
        };
        tracing::debug!(from = %self, to = %next, "State transition");
        Ok(next)
    }
}

impl From<TerminalState> for WorkflowState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Success => Self::Success,
            TerminalState::Abort => Self::Abort,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Classifying => write!(f, "classifying"),
            Self::Notifying { route } => write!(f, "notifying({route})"),
            Self::Success => write!(f, "success"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drive(route: Route) -> Vec<WorkflowState> {
        let mut states = vec![WorkflowState::Running];
        let mut state = WorkflowState::Running
            .transition(StateEvent::ChildFinished)
            .unwrap();
        states.push(state);
        state = state.transition(StateEvent::Classified(route)).unwrap();
        states.push(state);
        if !state.is_terminal() {
            state = state.transition(StateEvent::Dispatched).unwrap();
            states.push(state);
        }
        states
    }

    #[test]
    fn test_every_route_reaches_one_terminal_state() {
        let cases = [
            (Route::SilentAbort, TerminalState::Abort, 3),
            (Route::SilentSuccess, TerminalState::Success, 3),
            (Route::ErrorNotification, TerminalState::Abort, 4),
            (Route::SuccessNotification, TerminalState::Success, 4),
            (Route::ExceptionalNotification, TerminalState::Abort, 4),
        ];

        for (route, expected, steps) in cases {
            let states = drive(route);
            assert_eq!(states.len(), steps, "{route}");
            assert_eq!(states.last().and_then(WorkflowState::terminal), Some(expected));
            assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
        }
    }

    #[test]
    fn test_terminal_states_reject_events() {
        for state in [WorkflowState::Success, WorkflowState::Abort] {
            assert!(state.transition(StateEvent::ChildFinished).is_err());
            assert!(state.transition(StateEvent::Dispatched).is_err());
            assert!(state
                .transition(StateEvent::Classified(Route::SilentSuccess))
                .is_err());
        }
    }

    #[test]
    fn test_out_of_order_events_rejected() {
        assert!(WorkflowState::Running
            .transition(StateEvent::Dispatched)
            .is_err());
        assert!(WorkflowState::Classifying
            .transition(StateEvent::ChildFinished)
            .is_err());
    }
}
