//! Runs a small in-memory jobs workflow through the envelope and prints the
//! report.
//!
//! Usage: `cdpflow-demo [settings.json]`. Set `CDPFLOW_LOG_FORMAT=json` for
//! JSON logs.

use anyhow::Context;
use cdpflow::events::LoggingEventSink;
use cdpflow::jobs::{InMemoryTaskConfigSource, TaskConfig};
use cdpflow::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const DEMO_TASKS: [&str; 3] = ["ingest_orders", "refresh_marts", "export_reports"];

fn demo_settings() -> EngineSettings {
    EngineSettings::new("cdpflow-demo")
        .with_description("Demo workflow")
        .with_max_concurrency(2)
        .with_backoff(
            BackoffPolicy::new()
                .with_max_attempts(3)
                .with_initial_interval(Duration::from_millis(100)),
        )
        .with_jobs(JobsConfig::new(DEMO_TASKS))
}

async fn run_task(item: TaskItem) -> Result<serde_json::Value, TaskError> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if item.task_name == "export_reports" {
        return Err(TaskError::failed(&item.task_name, "exit code 1"));
    }
    Ok(json!({"task": item.task_name, "rows": 42}))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var("CDPFLOW_LOG_FORMAT")
        .ok()
        .map(|value| value.parse::<LogFormat>())
        .transpose()?
        .unwrap_or_default();
    init_logging(format)?;

    let settings = match std::env::args().nth(1) {
        Some(path) => EngineSettings::from_file(&path)
            .await
            .with_context(|| format!("loading settings from {path}"))?,
        None => demo_settings(),
    };

    let source = DEMO_TASKS
        .iter()
        .fold(InMemoryTaskConfigSource::new(), |source, task| {
            source.with_task(*task, TaskConfig::default().run_by_default())
        });
    let provider = Arc::new(JobConfigurator::new(settings.jobs.clone(), Arc::new(source)));
    let executor = Arc::new(FnExecutor::new("demo", run_task));
    let workflow =
        settings.build_jobs_workflow(provider, executor, Arc::new(LoggingEventSink::debug()));
    let envelope = settings
        .build_envelope(Arc::new(LoggingChannel))
        .with_event_sink(Arc::new(LoggingEventSink::debug()));

    let report = envelope
        .run(&workflow, WorkflowInput::new(json!({})))
        .await
        .context("running workflow")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
