//! Rendering of failure details into message text.

use crate::utils::title_case;
use serde_json::Value;

const ATHENA_PREFIX: &str = "AthenaQueryError";
const ATHENA_MARKER: &str = "You may need to manually clean the data at location";

/// Pretty JSON with sorted keys.
pub(crate) fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Cuts the cleanup advice off Athena query errors.
pub(crate) fn trim_error_message(message: &str) -> String {
    if message.starts_with(ATHENA_PREFIX) {
        if let Some((head, _)) = message.split_once(ATHENA_MARKER) {
            return format!("{}\"", head.trim());
        }
    }
    message.to_string()
}

/// Renders one error. Errors with a stack trace render as
/// `errorType: errorMessage` followed by the trace, anything else as JSON.
pub(crate) fn render_single_error(error: &Value) -> String {
    let Some(trace) = error.get("stackTrace") else {
        return format_json(error);
    };

    let error_type = error
        .get("errorType")
        .and_then(Value::as_str)
        .unwrap_or("Error");
    let message = trim_error_message(
        error
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    );
    let trace = match trace {
        Value::Array(lines) => lines.iter().filter_map(Value::as_str).collect::<String>(),
        Value::String(text) => text.clone(),
        other => format_json(other),
    };

    format!("Error in task:\n\n  {error_type}: {message}\n\n{trace}")
}

/// Renders an `error_summary` mapping of group name to `{item, error}`
/// entries.
pub(crate) fn render_error_summary(summary: &Value) -> Result<String, String> {
    let groups = summary
        .as_object()
        .ok_or_else(|| "error_summary is not an object".to_string())?;

    let mut lines = Vec::new();
    for (name, entries) in groups {
        let entries = entries
            .as_array()
            .ok_or_else(|| format!("error_summary group '{name}' is not a list"))?;

        lines.push(String::new());
        lines.push(format!("# **{}**", title_case(name)));
        lines.push(String::new());

        for entry in entries {
            let item = entry
                .get("item")
                .ok_or_else(|| format!("error_summary entry in '{name}' has no item"))?;
            let error = entry
                .get("error")
                .ok_or_else(|| format!("error_summary entry in '{name}' has no error"))?;
            let item = item
                .as_str()
                .map_or_else(|| item.to_string(), ToString::to_string);

            lines.push(format!("*{item}*"));
            lines.push(String::new());
            lines.push(render_single_error(error));
            lines.push(String::new());
        }
    }

    Ok(lines.join("\n").trim().to_string())
}

/// Renders a `Cause` field. JSON-encoded causes are decoded first; a plain
/// string is shown next to its `Error` name.
pub(crate) fn render_cause(details: &Value, cause: &Value) -> String {
    match cause {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(decoded) if decoded.is_object() => render_single_error(&decoded),
            _ => {
                let error = details
                    .get("Error")
                    .and_then(Value::as_str)
                    .unwrap_or("Error");
                format!("{error}: {text}")
            }
        },
        other => render_single_error(other),
    }
}
