//! End-to-end runs of the envelope around real child workflows.

#[cfg(test)]
mod tests {
    use crate::classifier::Diagnostic;
    use crate::core::{Route, TaskStatus, TerminalState, WorkflowInput};
    use crate::envelope::{ItemFailurePolicy, JobsWorkflow, WorkflowEnvelope};
    use crate::fanout::{BackoffPolicy, FanoutRunner};
    use crate::jobs::{InMemoryTaskConfigSource, JobConfigurator, JobsConfig, TaskConfig};
    use crate::notify::{CollectingChannel, DispatchFailurePolicy, NotificationDispatcher};
    use crate::parser::{DefaultErrorParser, NotifyOptions};
    use crate::testing::{
        assert_outcome, assert_published, assert_silent, ConcurrencyProbe, FailingWorkflow,
        PanickingWorkflow, ScriptedExecutor, StaticParser, StaticWorkflow, TestHarness,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn configurator(tasks: &[&str]) -> Arc<JobConfigurator> {
        let source = tasks.iter().fold(InMemoryTaskConfigSource::new(), |source, task| {
            source.with_task(*task, TaskConfig::default().run_by_default())
        });
        Arc::new(JobConfigurator::new(
            JobsConfig::new(tasks.iter().copied()),
            Arc::new(source),
        ))
    }

    fn fast_runner() -> FanoutRunner {
        FanoutRunner::new(4).with_backoff(
            BackoffPolicy::new()
                .with_max_attempts(3)
                .with_initial_interval(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_partial_item_failure_is_absorbed_silently() {
        let executor = Arc::new(ScriptedExecutor::new().failing("beta", "exit code 2"));
        let workflow = JobsWorkflow::new(configurator(&["alpha", "beta", "gamma"]), executor.clone())
            .with_runner(fast_runner());
        let harness = TestHarness::new("nightly");

        let report = harness.run(&workflow, json!({})).await.unwrap();

        assert_outcome(&report, Route::SilentSuccess, TerminalState::Success);
        assert_silent(&report);
        assert!(harness.channel.is_empty());
        assert_eq!(report.result["total"], 3);
        assert_eq!(report.result["failed"], 1);
        assert_eq!(report.result["use_case_name_list"], json!(["alpha", "gamma"]));
        assert_eq!(executor.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_success_notification_lists_processed_items() {
        let executor = Arc::new(ScriptedExecutor::new().failing("beta", "exit code 2"));
        let workflow = JobsWorkflow::new(configurator(&["gamma", "alpha", "beta"]), executor)
            .with_runner(fast_runner());
        let mut harness = TestHarness::new("nightly");
        harness.envelope = harness.envelope.clone().with_notify_options(NotifyOptions {
            notify_on_success: true,
            ..NotifyOptions::default()
        });

        let report = harness.run(&workflow, json!({})).await.unwrap();

        assert_outcome(&report, Route::SuccessNotification, TerminalState::Success);
        assert_published(&report, "nightly: Successful run");
        let body = &harness.channel.messages()[0].body;
        assert!(body.contains("The following use cases were processed: alpha,gamma"));
    }

    #[tokio::test]
    async fn test_escalated_item_failure_notifies_error() {
        let executor = Arc::new(ScriptedExecutor::new().failing("beta", "exit code 2"));
        let workflow = JobsWorkflow::new(configurator(&["alpha", "beta"]), executor)
            .with_runner(fast_runner())
            .with_failure_policy(ItemFailurePolicy::Escalate);
        let harness = TestHarness::new("nightly");

        let report = harness.run(&workflow, json!({})).await.unwrap();

        assert!(report.child_failed());
        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert_published(&report, "nightly: Failed");
        let body = &harness.channel.messages()[0].body;
        assert!(body.contains("# **Tasks**"));
        assert!(body.contains("beta"));
    }

    #[tokio::test]
    async fn test_child_error_publishes_exactly_one_error_notification() {
        let harness = TestHarness::new("nightly");
        let child = FailingWorkflow::new("warehouse unreachable");

        let report = harness.run(&child, json!({})).await.unwrap();

        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert_eq!(harness.channel.len(), 1);
        let message = &harness.channel.messages()[0];
        assert_eq!(message.subject, "nightly: Failed");
        assert_eq!(message.topic_id, "test-topic");
        assert!(message.body.starts_with("Dear Team,"));
        assert!(message.body.contains("WorkflowError: warehouse unreachable"));
    }

    #[tokio::test]
    async fn test_child_overrides_reach_the_message() {
        let harness = TestHarness::new("nightly");
        let child = FailingWorkflow::new("quota").with_payload(json!({
            "subject": "nightly: Quota reached",
            "message_attributes": {"team": {"DataType": "String", "StringValue": "data"}},
        }));

        let report = harness.run(&child, json!({})).await.unwrap();

        assert_published(&report, "nightly: Quota reached");
        let message = &harness.channel.messages()[0];
        assert_eq!(message.attributes["team"].string_value, "data");
    }

    #[tokio::test]
    async fn test_invalid_task_selection_fails_the_run() {
        let executor = Arc::new(ScriptedExecutor::new());
        let workflow = JobsWorkflow::new(configurator(&["alpha"]), executor.clone());
        let harness = TestHarness::new("nightly");

        let report = harness
            .run(&workflow, json!({"user_config": {"tasks": "alpha,rogue"}}))
            .await
            .unwrap();

        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert!(harness.channel.messages()[0].body.contains("rogue"));
        assert_eq!(executor.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_parser_record_takes_catch_all() {
        let parser = Arc::new(StaticParser::new(json!({
            "notify": true,
            "subject": "half a record",
            "message": "no success flag",
        })));
        let harness = TestHarness::with_parser("nightly", parser.clone());

        let report = harness.run(&StaticWorkflow::new(json!({"total": 0})), json!({})).await.unwrap();

        assert_outcome(&report, Route::ExceptionalNotification, TerminalState::Abort);
        assert!(matches!(report.diagnostic, Some(Diagnostic::Malformed { .. })));
        assert_published(&report, "nightly: Unexpected error");
        let body = &harness.channel.messages()[0].body;
        assert!(body.starts_with(&format!("Unexpected error in {}:", report.execution_id)));
        assert!(body.contains("half a record"));
        assert_eq!(parser.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_non_boolean_flags_take_catch_all() {
        let records = [
            json!({"notify": "yes", "success": true}),
            json!({"notify": true, "success": 1}),
            json!({"notify": null, "success": false}),
            json!([]),
            json!("done"),
            json!(null),
        ];
        for record in records {
            let harness = TestHarness::with_parser("nightly", Arc::new(StaticParser::new(record.clone())));
            let report = harness.run(&StaticWorkflow::new(json!({})), json!({})).await.unwrap();

            assert_eq!(report.route, Route::ExceptionalNotification, "record {record}");
            assert_eq!(report.state, TerminalState::Abort);
            assert_eq!(harness.channel.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_every_flag_combination_reaches_one_terminal_state() {
        let cases = [
            (false, false, Route::SilentAbort, 0),
            (false, true, Route::SilentSuccess, 0),
            (true, false, Route::ErrorNotification, 1),
            (true, true, Route::SuccessNotification, 1),
        ];
        for (notify, success, route, published) in cases {
            let parser = StaticParser::new(json!({
                "notify": notify,
                "success": success,
                "subject": "s",
                "message": "m",
            }));
            let harness = TestHarness::with_parser("nightly", Arc::new(parser));
            let report = harness.run(&StaticWorkflow::new(json!({})), json!({})).await.unwrap();

            assert_outcome(&report, route, route.terminal());
            assert_eq!(harness.channel.len(), published);
            assert_eq!(harness.events.events_of_type("workflow.completed").len(), 1);
        }
    }

    #[tokio::test]
    async fn test_panicking_child_is_caught() {
        let harness = TestHarness::new("nightly");

        let report = harness
            .run(&PanickingWorkflow::new("index out of bounds"), json!({}))
            .await
            .unwrap();

        assert!(report.child_failed());
        assert_eq!(report.result["error_info"]["Error"], "WorkflowPanicked");
        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert!(harness.channel.messages()[0]
            .body
            .contains("WorkflowPanicked: index out of bounds"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_policies() {
        let child = FailingWorkflow::new("boom");

        let propagating = TestHarness::with_failing_channel("nightly", DispatchFailurePolicy::Propagate);
        let err = propagating.run(&child, json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "DispatchError");
        assert_eq!(propagating.events.events_of_type("notification.failed").len(), 1);

        let tolerant =
            TestHarness::with_failing_channel("nightly", DispatchFailurePolicy::LogAndContinue);
        let report = tolerant.run(&child, json!({})).await.unwrap();
        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert!(report.notification.is_some());
        assert!(report.published().is_none());
    }

    fn chat_envelope(
        chat: Arc<CollectingChannel>,
        failures: Arc<CollectingChannel>,
    ) -> (WorkflowEnvelope, Arc<CollectingChannel>) {
        let primary = Arc::new(CollectingChannel::new());
        let dispatcher = NotificationDispatcher::new(primary.clone(), "test-topic")
            .with_secondary(chat, "data-team")
            .with_failure_channel(failures, "failures");
        let envelope = WorkflowEnvelope::new("nightly", Arc::new(DefaultErrorParser::new()), dispatcher);
        (envelope, primary)
    }

    #[tokio::test]
    async fn test_failed_run_is_copied_to_chat_and_failures() {
        let chat = Arc::new(CollectingChannel::new());
        let failures = Arc::new(CollectingChannel::new());
        let (envelope, primary) = chat_envelope(chat.clone(), failures.clone());

        let report = envelope
            .run(&FailingWorkflow::new("boom"), WorkflowInput::default())
            .await
            .unwrap();

        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert_eq!(primary.len(), 1);
        assert_eq!(chat.len(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(report.chat_notifications.len(), 2);
        assert_eq!(chat.messages()[0].subject, primary.messages()[0].subject);
    }

    #[tokio::test]
    async fn test_success_notification_skips_failures_channel() {
        let chat = Arc::new(CollectingChannel::new());
        let failures = Arc::new(CollectingChannel::new());
        let (envelope, primary) = chat_envelope(chat.clone(), failures.clone());
        let child = StaticWorkflow::new(json!({"total": 1}));
        let options = NotifyOptions {
            notify_on_success: true,
            ..NotifyOptions::default()
        };

        let report = envelope
            .with_notify_options(options)
            .run(&child, WorkflowInput::default())
            .await
            .unwrap();

        assert_outcome(&report, Route::SuccessNotification, TerminalState::Success);
        assert_eq!(primary.len(), 1);
        assert_eq!(chat.len(), 1);
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_failing_chat_channel_never_changes_terminal_state() {
        let chat = Arc::new(CollectingChannel::failing("webhook gone"));
        let failures = Arc::new(CollectingChannel::failing("webhook gone"));
        let (envelope, primary) = chat_envelope(chat, failures);

        let report = envelope
            .run(&FailingWorkflow::new("boom"), WorkflowInput::default())
            .await
            .unwrap();

        assert_outcome(&report, Route::ErrorNotification, TerminalState::Abort);
        assert!(report.published().is_some());
        assert_eq!(primary.len(), 1);
        assert_eq!(report.chat_notifications.len(), 2);
        assert!(report.chat_notifications.iter().all(|d| !d.is_delivered()));

        let silent = envelope
            .run(&StaticWorkflow::new(json!({})), WorkflowInput::default())
            .await
            .unwrap();
        assert_outcome(&silent, Route::SilentSuccess, TerminalState::Success);
        assert!(silent.chat_notifications.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_events_in_order() {
        let harness = TestHarness::new("nightly");

        harness.run(&FailingWorkflow::new("boom"), json!({})).await.unwrap();

        assert_eq!(
            harness.events.event_types(),
            vec![
                "workflow.started",
                "workflow.child_failed",
                "workflow.classified",
                "notification.published",
                "workflow.completed",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_item_recovers_without_affecting_siblings() {
        let tasks: Vec<String> = (1..=10).map(|i| format!("task-{i:02}")).collect();
        let names: Vec<&str> = tasks.iter().map(String::as_str).collect();
        let executor = Arc::new(ScriptedExecutor::new().throttled("task-05", 3));
        let workflow = JobsWorkflow::new(configurator(&names), executor.clone())
            .with_runner(FanoutRunner::new(10));
        let harness = TestHarness::new("nightly");

        let report = harness.run(&workflow, json!({})).await.unwrap();

        assert_outcome(&report, Route::SilentSuccess, TerminalState::Success);
        assert_eq!(report.result["succeeded"], 10);
        assert_eq!(executor.calls("task-05"), 4);
        for task in names.iter().filter(|t| **t != "task-05") {
            assert_eq!(executor.calls(task), 1, "{task}");
        }
        let results = report.result["results"].as_array().unwrap();
        let throttled = results.iter().find(|r| r["task_name"] == "task-05").unwrap();
        assert_eq!(throttled["attempts"], 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_item_fails_alone() {
        let tasks: Vec<String> = (1..=10).map(|i| format!("task-{i:02}")).collect();
        let names: Vec<&str> = tasks.iter().map(String::as_str).collect();
        let executor = Arc::new(ScriptedExecutor::new().throttled("task-05", 50));
        let workflow = JobsWorkflow::new(configurator(&names), executor.clone());
        let harness = TestHarness::new("nightly");

        let start = tokio::time::Instant::now();
        let report = harness.run(&workflow, json!({})).await.unwrap();
        let waited = start.elapsed().as_secs_f64();

        // Ten retries at 60s growing by 1.1 each time.
        let expected: f64 = (0..10).map(|n| 60.0 * 1.1_f64.powi(n)).sum();
        assert!((expected - 956.245).abs() < 0.01);
        assert!(
            waited >= expected - 1.0 && waited < expected + 5.0,
            "waited {waited}s, expected about {expected}s"
        );

        assert_outcome(&report, Route::SilentSuccess, TerminalState::Success);
        assert_eq!(report.result["succeeded"], 9);
        assert_eq!(report.result["failed"], 1);
        assert_eq!(executor.calls("task-05"), 11);
        let results = report.result["results"].as_array().unwrap();
        let exhausted = results.iter().find(|r| r["task_name"] == "task-05").unwrap();
        assert_eq!(exhausted["status"], json!(TaskStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fanout_respects_concurrency_cap_end_to_end() {
        let tasks: Vec<String> = (1..=12).map(|i| format!("task-{i:02}")).collect();
        let names: Vec<&str> = tasks.iter().map(String::as_str).collect();
        let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(50)));
        let workflow = JobsWorkflow::new(configurator(&names), probe.clone())
            .with_runner(FanoutRunner::new(3));
        let harness = TestHarness::new("nightly");

        let report = harness
            .envelope
            .run(&workflow, WorkflowInput::default())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.result["succeeded"], 12);
        assert!(probe.peak() <= 3);
        assert!(probe.peak() >= 1);
    }
}
