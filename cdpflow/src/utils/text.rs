//! String helpers shared by the job configurator and the error parser.

use regex::Regex;
use std::sync::OnceLock;

/// Splits a comma-separated list, trimming entries and dropping empty ones.
///
/// # Examples
///
/// ```
/// use cdpflow::utils::split_csl;
///
/// assert_eq!(split_csl(" a, b,,c "), vec!["a", "b", "c"]);
/// ```
#[must_use]
pub fn split_csl(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Uppercases the first letter of every word and lowercases the rest.
/// Any non-alphabetic character starts a new word.
#[must_use]
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

static TASK_NAME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn task_name_pattern() -> Option<&'static Regex> {
    TASK_NAME_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").ok())
        .as_ref()
}

/// Returns true if `name` is usable as a task identifier (and therefore as
/// a config file stem).
#[must_use]
pub fn is_valid_task_name(name: &str) -> bool {
    task_name_pattern().is_some_and(|pattern| pattern.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_csl() {
        assert_eq!(split_csl("etl,report"), vec!["etl", "report"]);
        assert!(split_csl("").is_empty());
        assert!(split_csl(" , ").is_empty());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("failed tasks"), "Failed Tasks");
        assert_eq!(title_case("failed_tasks"), "Failed_Tasks");
        assert_eq!(title_case("JOBS"), "Jobs");
    }

    #[test]
    fn test_task_names() {
        assert!(is_valid_task_name("daily_export"));
        assert!(is_valid_task_name("v2.report-sync"));
        assert!(!is_valid_task_name("../etc/passwd"));
        assert!(!is_valid_task_name(""));
        assert!(!is_valid_task_name("_hidden"));
    }
}
