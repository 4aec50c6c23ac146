//! Turns an invocation payload into task items.

use super::{
    AlwaysRun, ConfigurationProvider, ScheduleGate, TaskConfig, TaskConfigSource, UserConfig,
    UserTaskConfig,
};
use crate::core::{TaskItem, WorkflowInput};
use crate::errors::{CdpflowError, ConfigError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn default_job_module() -> String {
    "python".to_string()
}

/// Deployment-level settings of the job configurator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Tasks that may be run in this deployment.
    #[serde(default)]
    pub allowed_tasks: Vec<String>,
    /// Deployment scope, matched against `run.enabled_scopes`.
    #[serde(default)]
    pub scope: String,
    /// Account name, matched against `run.enabled_account_names`.
    #[serde(default)]
    pub account_name: String,
    /// Environment added to every task, overriding task values.
    #[serde(default)]
    pub task_env: BTreeMap<String, String>,
    /// Job, script or module that runs the tasks.
    #[serde(default = "default_job_module")]
    pub job_module: String,
    /// Requirements appended to every task's own.
    #[serde(default)]
    pub extra_requirements: Vec<String>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            allowed_tasks: Vec::new(),
            scope: String::new(),
            account_name: String::new(),
            task_env: BTreeMap::new(),
            job_module: default_job_module(),
            extra_requirements: Vec::new(),
        }
    }
}

impl JobsConfig {
    /// Creates a config allowing `tasks`.
    #[must_use]
    pub fn new<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_tasks: tasks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets scope and account name.
    #[must_use]
    pub fn with_deployment(mut self, scope: impl Into<String>, account_name: impl Into<String>) -> Self {
        self.scope = scope.into();
        self.account_name = account_name.into();
        self
    }

    /// Adds an environment variable passed to every task.
    #[must_use]
    pub fn with_task_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.task_env.insert(key.into(), value.into());
        self
    }

    /// Adds a requirement installed for every task.
    #[must_use]
    pub fn with_extra_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.extra_requirements.push(requirement.into());
        self
    }
}

/// The resolved job description stored in a task item's config blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Task name.
    pub task_name: String,
    /// Positional arguments.
    pub arguments: Vec<serde_json::Value>,
    /// Working directory.
    pub cwd: String,
    /// Script to run.
    pub entry_point: String,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Keyword arguments.
    pub kwargs: BTreeMap<String, serde_json::Value>,
    /// Extra library directories.
    pub python_lib_dirs: Vec<String>,
    /// Requirements to install.
    pub requirements: Vec<String>,
    /// The user's own overrides, as given.
    pub user_task_config: UserTaskConfig,
}

/// Default configuration provider.
///
/// Selects the candidate tasks (the user's, or every allowed task), loads
/// their configuration, applies the schedule check and emits one
/// [`TaskItem`] per selected task, sorted by name.
#[derive(Clone)]
pub struct JobConfigurator {
    config: JobsConfig,
    source: Arc<dyn TaskConfigSource>,
    gate: Arc<dyn ScheduleGate>,
}

impl std::fmt::Debug for JobConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConfigurator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobConfigurator {
    /// Creates a configurator that admits every scheduled task.
    #[must_use]
    pub fn new(config: JobsConfig, source: Arc<dyn TaskConfigSource>) -> Self {
        Self {
            config,
            source,
            gate: Arc::new(AlwaysRun),
        }
    }

    /// Sets the schedule gate.
    #[must_use]
    pub fn with_schedule_gate(mut self, gate: Arc<dyn ScheduleGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Returns the deployment settings.
    #[must_use]
    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    fn candidates(&self, user: &UserConfig) -> Result<Vec<String>, ConfigError> {
        let Some(tasks) = user.task_list() else {
            return Ok(self.config.allowed_tasks.clone());
        };

        let invalid: Vec<String> = tasks
            .iter()
            .filter(|task| !self.config.allowed_tasks.contains(*task))
            .cloned()
            .collect();
        if invalid.is_empty() {
            Ok(tasks)
        } else {
            Err(ConfigError::InvalidTasks { tasks: invalid })
        }
    }

    async fn load_configs(&self, tasks: &[String]) -> BTreeMap<String, TaskConfig> {
        let mut configs = BTreeMap::new();
        for task in tasks {
            match self.source.load(task).await {
                Ok(config) => {
                    configs.insert(task.clone(), config);
                }
                Err(e) => {
                    tracing::warn!(task = %task, error = %e, "Unable to load task config, skipping");
                }
            }
        }
        configs
    }

    fn run_config_allows(&self, task: &str, config: &TaskConfig) -> bool {
        if !config.run.allows_scope(&self.config.scope) {
            tracing::info!(task = %task, scope = %self.config.scope, "Task not enabled for scope");
            return false;
        }
        if !config.run.allows_account(&self.config.account_name) {
            tracing::info!(
                task = %task,
                account_name = %self.config.account_name,
                "Task not enabled for account"
            );
            return false;
        }
        true
    }

    async fn scheduled(
        &self,
        user: &UserConfig,
        configs: BTreeMap<String, TaskConfig>,
    ) -> BTreeMap<String, TaskConfig> {
        let user_specified = user.task_list().is_some();
        let mut selected = BTreeMap::new();
        for (task, config) in configs {
            if !self.run_config_allows(&task, &config) {
                continue;
            }
            if !user_specified && !config.run.default {
                tracing::debug!(task = %task, "Task does not run by default");
                continue;
            }
            match self.gate.admit(&task, &config).await {
                Ok(true) => {
                    tracing::info!(task = %task, "Task was triggered");
                    if user.update_run_db {
                        if let Err(e) = self.gate.record_run(&task, &config).await {
                            tracing::warn!(task = %task, error = %e, "Unable to record task run");
                        }
                    }
                    selected.insert(task, config);
                }
                Ok(false) => tracing::info!(task = %task, "Task was not triggered"),
                Err(e) => tracing::warn!(task = %task, error = %e, "Task has a trigger issue"),
            }
        }
        selected
    }

    fn job_spec(&self, task: &str, config: &TaskConfig, user: &UserConfig) -> JobSpec {
        let user_task_config = user.task_settings(task);
        let combined = user_task_config.combine(
            config
                .arguments
                .iter()
                .cloned()
                .map(serde_json::Value::String)
                .collect(),
            config.environment.clone(),
            config
                .kwargs
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        );

        let mut environment = combined.environment.unwrap_or_default();
        environment.extend(self.config.task_env.clone());

        let mut requirements = config.requirements.clone();
        requirements.extend(self.config.extra_requirements.iter().cloned());

        JobSpec {
            task_name: task.to_string(),
            arguments: combined.arguments.unwrap_or_default(),
            cwd: config.cwd.clone(),
            entry_point: config.entry_point.clone(),
            environment,
            kwargs: combined.kwargs.unwrap_or_default(),
            python_lib_dirs: config.python_lib_dirs.clone(),
            requirements,
            user_task_config,
        }
    }
}

#[async_trait]
impl ConfigurationProvider for JobConfigurator {
    async fn configure(&self, input: &WorkflowInput) -> Result<Vec<TaskItem>, CdpflowError> {
        let user = UserConfig::from_input(input)?;
        let candidates = self.candidates(&user)?;
        let configs = self.load_configs(&candidates).await;

        let selected = if user.check_schedule() {
            self.scheduled(&user, configs).await
        } else {
            configs
        };

        tracing::info!(
            candidates = candidates.len(),
            selected = selected.len(),
            "Configured jobs"
        );

        selected
            .iter()
            .map(|(task, config)| -> Result<TaskItem, CdpflowError> {
                let spec = self.job_spec(task, config, &user);
                Ok(TaskItem::new(task, &self.config.job_module)
                    .with_config(serde_json::to_value(spec)?))
            })
            .collect()
    }
}
