//! User-facing invocation settings.

use crate::core::WorkflowInput;
use crate::errors::ConfigError;
use crate::utils::split_csl;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-task overrides a user can pass with an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserTaskConfig {
    /// Positional arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<serde_json::Value>>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
    /// Keyword arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<BTreeMap<String, serde_json::Value>>,
}

impl UserTaskConfig {
    /// Fills every field the user left empty from the given defaults.
    #[must_use]
    pub fn combine(
        &self,
        default_arguments: Vec<serde_json::Value>,
        default_environment: BTreeMap<String, String>,
        default_kwargs: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            arguments: self
                .arguments
                .clone()
                .filter(|v| !v.is_empty())
                .or(Some(default_arguments)),
            environment: self
                .environment
                .clone()
                .filter(|v| !v.is_empty())
                .or(Some(default_environment)),
            kwargs: self
                .kwargs
                .clone()
                .filter(|v| !v.is_empty())
                .or(Some(default_kwargs)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskList {
    List(Vec<String>),
    Csl(String),
}

fn deserialize_task_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let tasks = Option::<TaskList>::deserialize(deserializer)?;
    Ok(tasks.map(|tasks| match tasks {
        TaskList::List(list) => list.iter().flat_map(|entry| split_csl(entry)).collect(),
        TaskList::Csl(value) => split_csl(&value),
    }))
}

fn default_true() -> bool {
    true
}

/// Settings a user can pass when starting the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// Free text comment, ignored.
    #[serde(default, rename = "Comment")]
    pub comment: Option<String>,
    /// Id of the execution that started this one, ignored.
    #[serde(default, alias = "AWS_STEP_FUNCTIONS_STARTED_BY_EXECUTION_ID")]
    pub started_by: Option<String>,
    /// Whether to honor task schedules. See [`UserConfig::check_schedule`].
    #[serde(default)]
    pub check_schedule: Option<bool>,
    /// Per-task overrides. Every key also selects the task.
    #[serde(default)]
    pub settings: Option<BTreeMap<String, UserTaskConfig>>,
    /// Selected tasks, as a list or a comma-separated string.
    #[serde(default, deserialize_with = "deserialize_task_list")]
    pub tasks: Option<Vec<String>>,
    /// Whether triggered tasks are recorded with the schedule gate.
    #[serde(default = "default_true")]
    pub update_run_db: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            comment: None,
            started_by: None,
            check_schedule: None,
            settings: None,
            tasks: None,
            update_run_db: true,
        }
    }
}

impl UserConfig {
    /// Reads the user config from a workflow input. The config may sit
    /// under `user_config` or be the whole payload; an empty payload means
    /// "no user settings".
    pub fn from_input(input: &WorkflowInput) -> Result<Self, ConfigError> {
        let raw = input.get("user_config").unwrap_or_else(|| input.as_value());
        if raw.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(raw).map_err(|e| ConfigError::InvalidPayload(e.to_string()))
    }

    /// The tasks the user asked for: the union of `tasks` and the keys of
    /// `settings`, or `None` if the user gave neither.
    #[must_use]
    pub fn task_list(&self) -> Option<Vec<String>> {
        if self.settings.is_none() && self.tasks.is_none() {
            return None;
        }
        let mut tasks: BTreeSet<String> = self.tasks.iter().flatten().cloned().collect();
        tasks.extend(self.settings.iter().flat_map(|s| s.keys().cloned()));
        Some(tasks.into_iter().collect())
    }

    /// Whether task schedules are checked.
    ///
    /// An explicit value wins; otherwise schedules are checked only when
    /// the user selected no tasks.
    #[must_use]
    pub fn check_schedule(&self) -> bool {
        self.check_schedule
            .unwrap_or_else(|| self.task_list().is_none())
    }

    /// Returns the user's overrides for `task`.
    #[must_use]
    pub fn task_settings(&self, task: &str) -> UserTaskConfig {
        self.settings
            .as_ref()
            .and_then(|settings| settings.get(task))
            .cloned()
            .unwrap_or_default()
    }
}
