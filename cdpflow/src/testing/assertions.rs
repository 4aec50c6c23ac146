//! Assertions over envelope reports.

use crate::core::{Route, TerminalState};
use crate::envelope::EnvelopeReport;

/// Asserts the report took `route` and ended in `state`.
///
/// # Panics
///
/// Panics if either differs.
pub fn assert_outcome(report: &EnvelopeReport, route: Route, state: TerminalState) {
    assert_eq!(
        report.route, route,
        "expected route {route}, got {} (diagnostic: {:?})",
        report.route, report.diagnostic
    );
    assert_eq!(report.state, state, "expected terminal state {state}");
}

/// Asserts a notification with `subject` was published.
///
/// # Panics
///
/// Panics if nothing was published or the subject differs.
pub fn assert_published(report: &EnvelopeReport, subject: &str) {
    let message = report
        .published()
        .unwrap_or_else(|| panic!("expected a published notification, got {:?}", report.notification));
    assert_eq!(message.subject, subject);
}

/// Asserts nothing was published.
///
/// # Panics
///
/// Panics if a notification was attempted.
pub fn assert_silent(report: &EnvelopeReport) {
    assert!(
        report.notification.is_none(),
        "expected no notification, got {:?}",
        report.notification
    );
}
