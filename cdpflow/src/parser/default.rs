//! Built-in error parser.

use super::render::{format_json, render_cause, render_error_summary};
use super::{ErrorParseResult, ErrorParser, ErrorParserRequest};
use crate::core::MessageAttributes;
use crate::errors::CdpflowError;
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_RECIPIENT: &str = "Team";
const DEFAULT_SIGNATURE: &str = "Workflow Notification";

/// Renders success and failure reports for the platform's batch workflows.
///
/// Successful runs are silent unless `notify_on_success` is set. Failures
/// always notify; their body lists the failed items from an
/// `error_summary`, or the single `Cause` of the failure. A result the
/// parser cannot make sense of still produces a notifying record with an
/// "error analysis failed" subject.
#[derive(Debug, Clone)]
pub struct DefaultErrorParser {
    recipient_name: String,
    signature: String,
}

impl Default for DefaultErrorParser {
    fn default() -> Self {
        Self {
            recipient_name: DEFAULT_RECIPIENT.to_string(),
            signature: DEFAULT_SIGNATURE.to_string(),
        }
    }
}

impl DefaultErrorParser {
    /// Creates a parser greeting "Team".
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default greeting name.
    #[must_use]
    pub fn with_recipient_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = name.into();
        self
    }

    /// Sets the signature line.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Produces the typed record for `request`. Never fails.
    #[must_use]
    pub fn analyze(&self, request: &ErrorParserRequest) -> ErrorParseResult {
        let analyzed = match request.error_info() {
            Some(details) => failed(request, details),
            None => successful(request),
        };

        let mut result = analyzed.unwrap_or_else(|reason| {
            tracing::error!(
                workflow = %request.workflow_name,
                execution_id = %request.execution_id,
                error = %reason,
                "Workflow error analysis failed"
            );
            analysis_failed(request, &reason)
        });

        if let Some(mail) = &request.options.recipient_mail {
            result = result.with_tag("recipient_mail", mail);
        }
        let recipient = request
            .options
            .recipient_name
            .as_deref()
            .unwrap_or(&self.recipient_name);
        result.subject = result.subject.trim().to_string();
        result.message = self.frame(recipient, &result.message);
        result
    }

    fn frame(&self, recipient: &str, message: &str) -> String {
        format!(
            "Dear {recipient},\n\n{}\n\n--\n{}",
            message.trim(),
            self.signature
        )
        .trim()
        .to_string()
    }
}

#[async_trait]
impl ErrorParser for DefaultErrorParser {
    async fn parse(&self, request: &ErrorParserRequest) -> Result<Value, CdpflowError> {
        self.analyze(request).to_record()
    }
}

fn successful(request: &ErrorParserRequest) -> Result<ErrorParseResult, String> {
    let mut info = String::new();
    if let Some(list) = request.result.get("use_case_name_list") {
        let mut names = list
            .as_array()
            .ok_or_else(|| "use_case_name_list is not a list".to_string())?
            .iter()
            .map(|name| {
                name.as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| format!("use case name {name} is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        info = format!("The following use cases were processed: {}", names.join(","));
    }

    let mut result = ErrorParseResult::new(
        format!("{}: Successful run", request.workflow_name),
        format!("{} has successfully completed.\n\n{info}", request.describe())
            .trim()
            .to_string(),
    );
    result.notify = request.options.notify_on_success;
    result.success = true;
    Ok(result)
}

fn failed(request: &ErrorParserRequest, details: &Value) -> Result<ErrorParseResult, String> {
    if !details.is_object() {
        return Err(format!(
            "{} is not an object: {details}",
            super::ERROR_FIELD
        ));
    }

    let info = if let Some(summary) = details.get("error_summary") {
        render_error_summary(summary)?
    } else if let Some(cause) = details.get("Cause") {
        render_cause(details, cause)
    } else {
        String::new()
    };

    let mut result = ErrorParseResult::new(
        format!("{}: Failed", request.workflow_name),
        format!("{} has failed.\n\n{info}", request.describe())
            .trim()
            .to_string(),
    );
    result.create_bug_tickets = request.options.create_bug_tickets;
    apply_overrides(&mut result, details);
    Ok(result)
}

/// Fields the child attached to its failure take precedence.
fn apply_overrides(result: &mut ErrorParseResult, details: &Value) {
    if let Some(subject) = details.get("subject").and_then(Value::as_str) {
        result.subject = subject.to_string();
    }
    if let Some(message) = details.get("message").and_then(Value::as_str) {
        result.message = message.to_string();
    }
    if let Some(attributes) = details
        .get("message_attributes")
        .cloned()
        .and_then(|value| serde_json::from_value::<MessageAttributes>(value).ok())
    {
        result.message_attributes.extend(attributes);
    }
    if let Some(notify) = details.get("notify").and_then(Value::as_bool) {
        result.notify = notify;
    }
    if let Some(success) = details.get("success").and_then(Value::as_bool) {
        result.success = success;
    }
}

fn analysis_failed(request: &ErrorParserRequest, reason: &str) -> ErrorParseResult {
    ErrorParseResult::new(
        format!("{}: Step Function error analysis failed", request.workflow_name),
        format!(
            "{} was unable to parse the workflow result!\n\
             This should never happen. Please inform the platform team!\n\n\
             {reason}\n{}",
            request.describe(),
            format_json(&request.result)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::parser::NotifyOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(result: Value) -> ErrorParserRequest {
        let ctx = ExecutionContext::new("nightly", "alerts").with_execution_id("exec-1");
        ErrorParserRequest::new(&ctx, result)
    }

    #[test]
    fn test_successful_run_is_silent() {
        let parsed = DefaultErrorParser::new().analyze(&request(json!({
            "use_case_name_list": ["pricing", "churn"],
        })));

        assert!(!parsed.notify);
        assert!(parsed.success);
        assert_eq!(parsed.subject, "nightly: Successful run");
        assert_eq!(
            parsed.message,
            "Dear Team,\n\nWorkflow 'nightly' has successfully completed.\n\n\
             The following use cases were processed: churn,pricing\n\n--\nWorkflow Notification"
        );
    }

    #[test]
    fn test_notify_on_success() {
        let req = request(json!({})).with_options(NotifyOptions {
            notify_on_success: true,
            ..NotifyOptions::default()
        });
        let parsed = DefaultErrorParser::new().analyze(&req);

        assert!(parsed.notify);
        assert!(parsed.success);
        assert!(parsed.message.contains("has successfully completed."));
    }

    #[test]
    fn test_failure_with_error_summary() {
        let parsed = DefaultErrorParser::new()
            .with_signature("Data Platform")
            .analyze(&request(json!({
                "error_info": {
                    "error_summary": {
                        "tasks": [{"item": "etl", "error": {"errorMessage": "boom"}}],
                    },
                },
            })));

        assert!(parsed.notify);
        assert!(!parsed.success);
        assert_eq!(parsed.subject, "nightly: Failed");
        assert_eq!(
            parsed.message,
            "Dear Team,\n\nWorkflow 'nightly' has failed.\n\n# **Tasks**\n\n*etl*\n\n\
             {\n  \"errorMessage\": \"boom\"\n}\n\n--\nData Platform"
        );
    }

    #[test]
    fn test_failure_with_plain_cause() {
        let parsed = DefaultErrorParser::new().analyze(&request(json!({
            "error_info": {"Error": "WorkflowError", "Cause": "no tasks configured"},
        })));

        assert_eq!(parsed.subject, "nightly: Failed");
        assert!(parsed
            .message
            .contains("has failed.\n\nWorkflowError: no tasks configured"));
    }

    #[test]
    fn test_child_overrides_win() {
        let parsed = DefaultErrorParser::new().analyze(&request(json!({
            "error_info": {
                "Error": "WorkflowError",
                "Cause": "quota",
                "subject": "  nightly: quota reached ",
                "message": "Quota reached, nothing to do.",
                "notify": false,
                "message_attributes": {"severity": {"DataType": "String", "StringValue": "low"}},
            },
        })));

        assert_eq!(parsed.subject, "nightly: quota reached");
        assert!(!parsed.notify);
        assert!(!parsed.success);
        assert_eq!(
            parsed.message,
            "Dear Team,\n\nQuota reached, nothing to do.\n\n--\nWorkflow Notification"
        );
        assert_eq!(parsed.message_attributes["severity"].string_value, "low");
    }

    #[test]
    fn test_unparseable_error_info() {
        let parsed = DefaultErrorParser::new().analyze(&request(json!({"error_info": "oops"})));

        assert!(parsed.notify);
        assert!(!parsed.success);
        assert_eq!(parsed.subject, "nightly: Step Function error analysis failed");
        assert!(parsed.message.contains("was unable to parse the workflow result!"));
    }

    #[test]
    fn test_recipient_options() {
        let req = request(json!({"error_info": {"Cause": "x"}})).with_options(NotifyOptions {
            recipient_name: Some("jane".to_string()),
            recipient_mail: Some("jane@example.com".to_string()),
            create_bug_tickets: true,
            ..NotifyOptions::default()
        });
        let parsed = DefaultErrorParser::new().analyze(&req);

        assert!(parsed.message.starts_with("Dear jane,"));
        assert!(parsed.create_bug_tickets);
        assert_eq!(
            parsed.message_attributes["recipient_mail"].string_value,
            "jane@example.com"
        );
    }

    #[tokio::test]
    async fn test_parse_returns_classifiable_record() {
        let record = DefaultErrorParser::new()
            .parse(&request(json!({"error_info": {"Cause": "x"}})))
            .await
            .unwrap();

        let classification = crate::classifier::classify(&record);
        assert_eq!(classification.route, crate::core::Route::ErrorNotification);
    }
}
