//! Result classification.
//!
//! Maps a parsed outcome record onto one of the notify/terminate routes:
//!
//! | notify | success | route |
//! |--------|---------|-------|
//! | false  | false   | [`Route::SilentAbort`] |
//! | false  | true    | [`Route::SilentSuccess`] |
//! | true   | false   | [`Route::ErrorNotification`] |
//! | true   | true    | [`Route::SuccessNotification`] |
//! | other  |         | [`Route::ExceptionalNotification`] |
//!
//! Classification is a pure function of its input.

use crate::core::{ExecutionOutcome, MessageAttributes, Route};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a flag could not be read from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagProblem {
    /// The field is absent (or the record is not an object).
    Missing,
    /// The field is present but not a boolean.
    NotBoolean,
}

impl fmt::Display for FlagProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::NotBoolean => write!(f, "not a boolean"),
        }
    }
}

/// Why a classification ended on the catch-all route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The record's `notify`/`success` fields are unusable.
    Malformed {
        /// `(field, problem)` for every unusable flag.
        problems: Vec<(String, FlagProblem)>,
    },
    /// The error parser failed before producing a record.
    ParserFailure {
        /// The parser's error message.
        reason: String,
    },
}

impl Diagnostic {
    /// Short label used as a routing attribute.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed_outcome",
            Self::ParserFailure { .. } => "parser_failure",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { problems } => {
                let parts: Vec<_> = problems
                    .iter()
                    .map(|(field, problem)| format!("'{field}' {problem}"))
                    .collect();
                write!(f, "malformed outcome: {}", parts.join(", "))
            }
            Self::ParserFailure { reason } => write!(f, "error parser failed: {reason}"),
        }
    }
}

/// The classifier's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// The selected route.
    pub route: Route,
    /// The validated outcome; absent on the catch-all route.
    pub outcome: Option<ExecutionOutcome>,
    /// Why the catch-all route was taken.
    pub diagnostic: Option<Diagnostic>,
}

impl Classification {
    /// Classification for a failed error parser.
    #[must_use]
    pub fn parser_failure(reason: impl Into<String>) -> Self {
        Self {
            route: Route::ExceptionalNotification,
            outcome: None,
            diagnostic: Some(Diagnostic::ParserFailure {
                reason: reason.into(),
            }),
        }
    }
}

fn read_flag(record: &serde_json::Value, field: &str) -> Result<bool, FlagProblem> {
    match record.get(field) {
        None | Some(serde_json::Value::Null) => Err(FlagProblem::Missing),
        Some(serde_json::Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(FlagProblem::NotBoolean),
    }
}

fn read_text(record: &serde_json::Value, field: &str) -> String {
    record
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn read_attributes(record: &serde_json::Value) -> MessageAttributes {
    record
        .get("message_attributes")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

/// Classifies a parsed outcome record.
#[must_use]
pub fn classify(record: &serde_json::Value) -> Classification {
    let notify = read_flag(record, "notify");
    let success = read_flag(record, "success");

    let route = match (notify, success) {
        (Ok(false), Ok(false)) => Route::SilentAbort,
        (Ok(false), Ok(true)) => Route::SilentSuccess,
        (Ok(true), Ok(false)) => Route::ErrorNotification,
        (Ok(true), Ok(true)) => Route::SuccessNotification,
        (notify, success) => {
            let problems = [("notify", notify), ("success", success)]
                .into_iter()
                .filter_map(|(field, flag)| flag.err().map(|p| (field.to_string(), p)))
                .collect();
            return Classification {
                route: Route::ExceptionalNotification,
                outcome: None,
                diagnostic: Some(Diagnostic::Malformed { problems }),
            };
        }
    };

    let outcome = ExecutionOutcome {
        notify: route.notifies(),
        success: route.terminal() == crate::core::TerminalState::Success,
        subject: read_text(record, "subject"),
        message: read_text(record, "message"),
        message_attributes: read_attributes(record),
    };

    Classification {
        route,
        outcome: Some(outcome),
        diagnostic: None,
    }
}
