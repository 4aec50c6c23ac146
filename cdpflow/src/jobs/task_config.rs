//! Standardized task configuration and where it is loaded from.

use crate::errors::ConfigError;
use crate::utils::is_valid_task_name;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// When a task wants to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRunConfig {
    /// Run on scheduled invocations without being selected.
    #[serde(default)]
    pub default: bool,
    /// Accounts the task may run in; `None` means all.
    #[serde(default)]
    pub enabled_account_names: Option<Vec<String>>,
    /// Scopes the task may run in; `None` means all.
    #[serde(default)]
    pub enabled_scopes: Option<Vec<String>>,
    /// Schedule description, interpreted by the schedule gate.
    #[serde(default)]
    pub frequency: serde_json::Map<String, serde_json::Value>,
}

fn in_optional_list(value: &str, list: Option<&Vec<String>>) -> bool {
    list.map_or(true, |list| list.iter().any(|entry| entry == value))
}

impl TaskRunConfig {
    /// Returns true if the task is enabled for `scope`.
    #[must_use]
    pub fn allows_scope(&self, scope: &str) -> bool {
        in_optional_list(scope, self.enabled_scopes.as_ref())
    }

    /// Returns true if the task is enabled for `account_name`.
    #[must_use]
    pub fn allows_account(&self, account_name: &str) -> bool {
        in_optional_list(account_name, self.enabled_account_names.as_ref())
    }
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_entry_point() -> String {
    "script.py".to_string()
}

/// A task's deployed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Default positional arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Working directory.
    #[serde(default = "default_cwd")]
    pub cwd: String,
    /// Script to run.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Default environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Default keyword arguments.
    #[serde(default)]
    pub kwargs: BTreeMap<String, String>,
    /// Extra library directories.
    #[serde(default)]
    pub python_lib_dirs: Vec<String>,
    /// Package requirements.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Run configuration.
    #[serde(default)]
    pub run: TaskRunConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            arguments: Vec::new(),
            cwd: default_cwd(),
            entry_point: default_entry_point(),
            environment: BTreeMap::new(),
            kwargs: BTreeMap::new(),
            python_lib_dirs: Vec::new(),
            requirements: Vec::new(),
            run: TaskRunConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Parses a task configuration document.
    pub fn from_json_str(task: &str, json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::TaskConfig {
            task: task.to_string(),
            reason: e.to_string(),
        })
    }

    /// Marks the task as running by default.
    #[must_use]
    pub fn run_by_default(mut self) -> Self {
        self.run.default = true;
        self
    }
}

/// Provides the configuration of a task by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskConfigSource: Send + Sync {
    /// Loads the configuration for `task`.
    async fn load(&self, task: &str) -> Result<TaskConfig, ConfigError>;
}

/// Task configurations held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskConfigSource {
    configs: HashMap<String, TaskConfig>,
}

impl InMemoryTaskConfigSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task configuration.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>, config: TaskConfig) -> Self {
        self.configs.insert(task.into(), config);
        self
    }
}

#[async_trait]
impl TaskConfigSource for InMemoryTaskConfigSource {
    async fn load(&self, task: &str) -> Result<TaskConfig, ConfigError> {
        self.configs
            .get(task)
            .cloned()
            .ok_or_else(|| ConfigError::TaskConfig {
                task: task.to_string(),
                reason: "no configuration registered".to_string(),
            })
    }
}

/// Reads `<dir>/<task>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryTaskConfigSource {
    dir: PathBuf,
}

impl DirectoryTaskConfigSource {
    /// Creates a source rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the configuration file for `task`.
    #[must_use]
    pub fn config_path(&self, task: &str) -> PathBuf {
        self.dir.join(format!("{task}.json"))
    }
}

#[async_trait]
impl TaskConfigSource for DirectoryTaskConfigSource {
    async fn load(&self, task: &str) -> Result<TaskConfig, ConfigError> {
        if !is_valid_task_name(task) {
            return Err(ConfigError::TaskConfig {
                task: task.to_string(),
                reason: "task name is not a valid file name".to_string(),
            });
        }

        let path = self.config_path(task);
        tracing::info!(task = %task, path = %path.display(), "Loading task config");

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::TaskConfig {
                task: task.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
        TaskConfig::from_json_str(task, &contents)
    }
}
