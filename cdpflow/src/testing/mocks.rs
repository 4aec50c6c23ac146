//! Mock executors, workflows and parsers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::core::{TaskItem, WorkflowInput};
use crate::envelope::ChildWorkflow;
use crate::errors::{CdpflowError, TaskError};
use crate::fanout::TaskExecutor;
use crate::parser::{ErrorParser, ErrorParserRequest};

/// An executor that plays back scripted responses per task.
///
/// Each task consumes its script front to back; once the script is empty
/// (or if none was given) the task succeeds with the default output.
#[derive(Debug)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, TaskError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    default_output: serde_json::Value,
    delay: Option<Duration>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    /// Creates an executor where every task succeeds with `{"ok": true}`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            default_output: serde_json::json!({"ok": true}),
            delay: None,
        }
    }

    /// Scripts the responses of `task`.
    #[must_use]
    pub fn with_script(
        self,
        task: impl Into<String>,
        responses: Vec<Result<serde_json::Value, TaskError>>,
    ) -> Self {
        self.scripts.lock().insert(task.into(), responses.into());
        self
    }

    /// Makes `task` fail once with an ordinary error.
    #[must_use]
    pub fn failing(self, task: impl Into<String>, message: impl Into<String>) -> Self {
        let task = task.into();
        let error = TaskError::failed(&task, message);
        self.with_script(task, vec![Err(error)])
    }

    /// Makes `task` hit the concurrency limit `times` times before
    /// succeeding.
    #[must_use]
    pub fn throttled(self, task: impl Into<String>, times: usize) -> Self {
        let task = task.into();
        let responses = (0..times)
            .map(|_| Err(TaskError::concurrency_exceeded(&task)))
            .collect();
        self.with_script(task, responses)
    }

    /// Sleeps before every response.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns how many times `task` was executed.
    #[must_use]
    pub fn calls(&self, task: &str) -> usize {
        self.calls.lock().get(task).copied().unwrap_or(0)
    }

    /// Returns the number of executions across all tasks.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, item: &TaskItem) -> Result<serde_json::Value, TaskError> {
        *self.calls.lock().entry(item.task_name.clone()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .scripts
            .lock()
            .get_mut(&item.task_name)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(self.default_output.clone()))
    }
}

/// An executor that records the peak number of concurrent executions.
#[derive(Debug)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl ConcurrencyProbe {
    /// Creates a probe whose executions take `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        }
    }

    /// Returns the highest concurrency observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for ConcurrencyProbe {
    async fn execute(&self, item: &TaskItem) -> Result<serde_json::Value, TaskError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(serde_json::json!({"task": item.task_name}))
    }
}

/// A workflow that returns a fixed result.
#[derive(Debug, Clone)]
pub struct StaticWorkflow {
    result: serde_json::Value,
}

impl StaticWorkflow {
    /// Creates a workflow returning `result`.
    #[must_use]
    pub fn new(result: serde_json::Value) -> Self {
        Self { result }
    }
}

#[async_trait]
impl ChildWorkflow for StaticWorkflow {
    async fn run(
        &self,
        _ctx: &ExecutionContext,
        _input: &WorkflowInput,
    ) -> Result<serde_json::Value, CdpflowError> {
        Ok(self.result.clone())
    }
}

/// A workflow that always fails.
#[derive(Debug, Clone)]
pub struct FailingWorkflow {
    message: String,
    payload: serde_json::Value,
}

impl FailingWorkflow {
    /// Creates a workflow failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attaches a structured payload to the failure.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[async_trait]
impl ChildWorkflow for FailingWorkflow {
    async fn run(
        &self,
        _ctx: &ExecutionContext,
        _input: &WorkflowInput,
    ) -> Result<serde_json::Value, CdpflowError> {
        Err(CdpflowError::workflow(&self.message, self.payload.clone()))
    }
}

/// A workflow that panics.
#[derive(Debug, Clone)]
pub struct PanickingWorkflow {
    message: String,
}

impl PanickingWorkflow {
    /// Creates a workflow panicking with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChildWorkflow for PanickingWorkflow {
    #[allow(clippy::panic)]
    async fn run(
        &self,
        _ctx: &ExecutionContext,
        _input: &WorkflowInput,
    ) -> Result<serde_json::Value, CdpflowError> {
        panic!("{}", self.message)
    }
}

/// A parser that returns the same record for every request.
#[derive(Debug)]
pub struct StaticParser {
    record: serde_json::Value,
    requests: Mutex<Vec<ErrorParserRequest>>,
}

impl StaticParser {
    /// Creates a parser returning `record`.
    #[must_use]
    pub fn new(record: serde_json::Value) -> Self {
        Self {
            record,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ErrorParserRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ErrorParser for StaticParser {
    async fn parse(&self, request: &ErrorParserRequest) -> Result<serde_json::Value, CdpflowError> {
        self.requests.lock().push(request.clone());
        Ok(self.record.clone())
    }
}
